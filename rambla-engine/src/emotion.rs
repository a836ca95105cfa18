//! Keyword-based emotion detection.
//!
//! Metadata only: the detected emotion decorates the system prompt with a
//! tone instruction and the response with `detected_emotion`; it never
//! influences model routing.

use rambla_core::UserEmotion;

const EMOTION_KEYWORDS: [(UserEmotion, &[&str]); 7] = [
    (
        UserEmotion::Bored,
        &["aburrido", "aburrida", "nada que hacer", "sin planes", "qué hacer hoy", "me aburro", "bored"],
    ),
    (
        UserEmotion::Excited,
        &["emocionado", "emocionada", "genial", "vamos a", "¡vamos!", "excited", "can't wait"],
    ),
    (
        UserEmotion::Romantic,
        &["romántico", "romántica", "pareja", "cita", "enamorado", "enamorada", "novio", "novia", "noche especial", "date night"],
    ),
    (
        UserEmotion::Stressed,
        &["estresado", "estresada", "urgente", "prisa", "no tengo tiempo", "ocupado", "ocupada", "in a hurry"],
    ),
    (
        UserEmotion::Adventurous,
        &["aventura", "exploremos", "algo loco", "diferente", "probemos", "nunca he", "adventure"],
    ),
    (
        UserEmotion::Tired,
        &["cansado", "cansada", "fatigado", "relajado", "relajada", "sin energía", "descansar", "tired"],
    ),
    (
        UserEmotion::Celebratory,
        &["cumpleaños", "celebrar", "fiesta", "aniversario", "despedida", "boda", "birthday", "celebrate"],
    ),
];

/// Detects user emotion from the query text by keyword counting.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionDetector;

impl EmotionDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the dominant emotion. Confidence scales with the number of
    /// matched keywords, capped at 0.95; no matches yields a low-confidence
    /// neutral.
    pub fn detect(&self, query: &str) -> (UserEmotion, f32) {
        let lower = query.to_lowercase();

        let mut best: Option<(UserEmotion, usize)> = None;
        for (emotion, keywords) in EMOTION_KEYWORDS {
            let matches = keywords.iter().filter(|kw| lower.contains(*kw)).count();
            if matches > 0 && best.map_or(true, |(_, n)| matches > n) {
                best = Some((emotion, matches));
            }
        }

        match best {
            Some((emotion, matches)) => (emotion, (matches as f32 * 0.4).min(0.95)),
            None => (UserEmotion::Neutral, 0.3),
        }
    }

    /// Tone instruction appended to the system prompt.
    pub fn tone_instruction(&self, emotion: UserEmotion) -> &'static str {
        match emotion {
            UserEmotion::Bored => "Be enthusiastic, suggest variety and novelty",
            UserEmotion::Excited => "Match their energy, be expressive and bold",
            UserEmotion::Romantic => "Be elegant, thoughtful, and suggest special places",
            UserEmotion::Stressed => "Be concise, efficient, and direct - save time",
            UserEmotion::Adventurous => "Be exploratory, suggest unique and bold options",
            UserEmotion::Tired => "Be calm, gentle, suggest relaxing places",
            UserEmotion::Celebratory => "Be festive, energetic, suggest premium options",
            UserEmotion::Neutral => "Be balanced, helpful, and professional",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_romantic() {
        let detector = EmotionDetector::new();
        let (emotion, confidence) = detector.detect("algo romántico para una cita con mi novia");
        assert_eq!(emotion, UserEmotion::Romantic);
        assert!(confidence > 0.9);
    }

    #[test]
    fn test_single_keyword_confidence() {
        let detector = EmotionDetector::new();
        let (emotion, confidence) = detector.detect("estoy muy cansado hoy");
        assert_eq!(emotion, UserEmotion::Tired);
        assert!((confidence - 0.4).abs() < 0.01);
    }

    #[test]
    fn test_neutral_fallback() {
        let detector = EmotionDetector::new();
        let (emotion, confidence) = detector.detect("buscar restaurantes en Zaragoza");
        assert_eq!(emotion, UserEmotion::Neutral);
        assert!((confidence - 0.3).abs() < 0.01);
    }

    #[test]
    fn test_confidence_capped() {
        let detector = EmotionDetector::new();
        let (_, confidence) =
            detector.detect("cumpleaños fiesta aniversario boda despedida celebrar");
        assert!(confidence <= 0.95);
    }

    #[test]
    fn test_every_emotion_has_a_tone() {
        let detector = EmotionDetector::new();
        for emotion in [
            UserEmotion::Bored,
            UserEmotion::Excited,
            UserEmotion::Romantic,
            UserEmotion::Stressed,
            UserEmotion::Adventurous,
            UserEmotion::Tired,
            UserEmotion::Celebratory,
            UserEmotion::Neutral,
        ] {
            assert!(!detector.tone_instruction(emotion).is_empty());
        }
    }
}
