//! Localized user-facing error messages.
//!
//! Messages never leak internal identifiers or stack content; they say what
//! went wrong in the user's language and nothing else.

use rambla_core::{ErrorKind, Language};

/// The user-facing message for an error kind in a language.
pub fn user_message(kind: ErrorKind, language: Language) -> &'static str {
    match language {
        Language::Es => spanish(kind),
        Language::En => english(kind),
        Language::Ca => catalan(kind),
        Language::Gl => galician(kind),
    }
}

fn spanish(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidSession => "La sesión no es válida. Vuelve a empezar la conversación.",
        ErrorKind::UnsupportedLanguage => "Ese idioma no está disponible todavía.",
        ErrorKind::InvalidLocation => "La ubicación indicada no es válida.",
        ErrorKind::MemoryUnavailable => "No puedo recuperar la conversación ahora mismo. Inténtalo de nuevo en unos segundos.",
        ErrorKind::ClassificationFailed => "No he entendido bien la petición. ¿Puedes reformularla?",
        ErrorKind::ModelError => "Ha habido un problema generando la respuesta. Inténtalo de nuevo.",
        ErrorKind::ToolError => "No he podido consultar la información de lugares. Inténtalo de nuevo.",
        ErrorKind::Timeout => "La petición ha tardado demasiado. Inténtalo de nuevo.",
        ErrorKind::Cancelled => "La petición se ha cancelado.",
        ErrorKind::Overloaded => "Hay mucha demanda ahora mismo. Espera un momento y vuelve a intentarlo.",
        ErrorKind::PersistenceFailed => "No he podido guardar la conversación, pero aquí tienes la respuesta.",
    }
}

fn english(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidSession => "That session is not valid. Please start a new conversation.",
        ErrorKind::UnsupportedLanguage => "That language is not available yet.",
        ErrorKind::InvalidLocation => "The location provided is not valid.",
        ErrorKind::MemoryUnavailable => "I can't retrieve the conversation right now. Please try again shortly.",
        ErrorKind::ClassificationFailed => "I didn't quite understand that. Could you rephrase?",
        ErrorKind::ModelError => "Something went wrong generating the answer. Please try again.",
        ErrorKind::ToolError => "I couldn't look up place information. Please try again.",
        ErrorKind::Timeout => "The request took too long. Please try again.",
        ErrorKind::Cancelled => "The request was cancelled.",
        ErrorKind::Overloaded => "We're very busy right now. Please wait a moment and retry.",
        ErrorKind::PersistenceFailed => "I couldn't save the conversation, but here is your answer.",
    }
}

fn catalan(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidSession => "La sessió no és vàlida. Torna a començar la conversa.",
        ErrorKind::UnsupportedLanguage => "Aquest idioma encara no està disponible.",
        ErrorKind::InvalidLocation => "La ubicació indicada no és vàlida.",
        ErrorKind::MemoryUnavailable => "Ara mateix no puc recuperar la conversa. Torna-ho a provar d'aquí a uns segons.",
        ErrorKind::ClassificationFailed => "No he entès bé la petició. Pots reformular-la?",
        ErrorKind::ModelError => "Hi ha hagut un problema generant la resposta. Torna-ho a provar.",
        ErrorKind::ToolError => "No he pogut consultar la informació de llocs. Torna-ho a provar.",
        ErrorKind::Timeout => "La petició ha trigat massa. Torna-ho a provar.",
        ErrorKind::Cancelled => "La petició s'ha cancel·lat.",
        ErrorKind::Overloaded => "Hi ha molta demanda ara mateix. Espera un moment i torna-ho a provar.",
        ErrorKind::PersistenceFailed => "No he pogut desar la conversa, però aquí tens la resposta.",
    }
}

fn galician(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidSession => "A sesión non é válida. Volve comezar a conversa.",
        ErrorKind::UnsupportedLanguage => "Ese idioma aínda non está dispoñible.",
        ErrorKind::InvalidLocation => "A localización indicada non é válida.",
        ErrorKind::MemoryUnavailable => "Non podo recuperar a conversa agora mesmo. Téntao de novo nuns segundos.",
        ErrorKind::ClassificationFailed => "Non entendín ben a petición. Podes reformulala?",
        ErrorKind::ModelError => "Houbo un problema xerando a resposta. Téntao de novo.",
        ErrorKind::ToolError => "Non puiden consultar a información de lugares. Téntao de novo.",
        ErrorKind::Timeout => "A petición tardou demasiado. Téntao de novo.",
        ErrorKind::Cancelled => "A petición cancelouse.",
        ErrorKind::Overloaded => "Hai moita demanda agora mesmo. Agarda un momento e téntao de novo.",
        ErrorKind::PersistenceFailed => "Non puiden gardar a conversa, pero aquí tes a resposta.",
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [ErrorKind; 11] = [
        ErrorKind::InvalidSession,
        ErrorKind::UnsupportedLanguage,
        ErrorKind::InvalidLocation,
        ErrorKind::MemoryUnavailable,
        ErrorKind::ClassificationFailed,
        ErrorKind::ModelError,
        ErrorKind::ToolError,
        ErrorKind::Timeout,
        ErrorKind::Cancelled,
        ErrorKind::Overloaded,
        ErrorKind::PersistenceFailed,
    ];

    #[test]
    fn test_every_kind_has_a_message_in_every_language() {
        for kind in ALL_KINDS {
            for language in [Language::Es, Language::En, Language::Ca, Language::Gl] {
                assert!(!user_message(kind, language).is_empty());
            }
        }
    }

    #[test]
    fn test_messages_do_not_leak_internals() {
        for kind in ALL_KINDS {
            for language in [Language::Es, Language::En, Language::Ca, Language::Gl] {
                let message = user_message(kind, language);
                assert!(!message.contains("uuid"));
                assert!(!message.contains("panic"));
                assert!(!message.contains("sql"));
            }
        }
    }
}
