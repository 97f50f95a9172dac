//! Builds the ordered message list sent upstream: a system prompt derived
//! from the user's saved profile, the thread's readable history, then the
//! new utterance.

use braid_llm::{ChatMessage, ChatRole};
use braid_persist::{Message, MessageRole};

use crate::account::UserProfile;

const PREAMBLE: &str = "You are a helpful assistant taking part in an ongoing conversation.";
const NO_PREFERENCES: &str =
    "The user has not shared any preferences about how you should respond.";

pub fn system_prompt(profile: &UserProfile) -> String {
    let mut parts = vec![PREAMBLE.to_string()];

    if !profile.nickname.is_empty() {
        parts.push(format!("The user prefers to be called {}.", profile.nickname));
    }
    if !profile.occupation.is_empty() {
        parts.push(format!("The user works as {}.", profile.occupation));
    }
    if !profile.traits.is_empty() {
        parts.push(format!(
            "The user would like you to be {}.",
            profile.traits.join(", ")
        ));
    }
    if !profile.additional_info.is_empty() {
        parts.push(format!(
            "Additional context shared by the user: {}",
            profile.additional_info
        ));
    }

    if parts.len() == 1 {
        parts.push(NO_PREFERENCES.to_string());
    }

    parts.join(" ")
}

pub fn build_conversation(
    profile: &UserProfile,
    history: &[Message],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut conversation = Vec::with_capacity(history.len() + 2);
    conversation.push(ChatMessage::system(system_prompt(profile)));

    for turn in history {
        let role = match turn.role {
            MessageRole::User => ChatRole::User,
            MessageRole::Assistant => ChatRole::Assistant,
            MessageRole::System => ChatRole::System,
        };
        conversation.push(ChatMessage {
            role,
            content: turn.content.clone(),
        });
    }

    conversation.push(ChatMessage::user(user_message));
    conversation
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_persist::MessageStatus;
    use mongodb::bson::oid::ObjectId;

    fn profile() -> UserProfile {
        UserProfile {
            nickname: "Sam".to_string(),
            occupation: "a field biologist".to_string(),
            traits: vec!["curious".to_string(), "direct".to_string()],
            additional_info: "Working on a wetlands survey.".to_string(),
        }
    }

    fn history_message(role: MessageRole, content: &str) -> Message {
        Message {
            id: ObjectId::new(),
            thread_id: ObjectId::new(),
            user_id: "u1".to_string(),
            role,
            content: content.to_string(),
            created_at: "2024-03-15T10:00:00.000Z".to_string(),
            status: MessageStatus::Finished,
            model: None,
            tokens: None,
            premium: None,
        }
    }

    #[test]
    fn test_system_prompt_with_full_profile() {
        let prompt = system_prompt(&profile());

        assert!(prompt.contains("called Sam"));
        assert!(prompt.contains("a field biologist"));
        assert!(prompt.contains("curious, direct"));
        assert!(prompt.contains("wetlands survey"));
        assert!(!prompt.contains(NO_PREFERENCES));
    }

    #[test]
    fn test_system_prompt_omits_absent_fields() {
        let profile = UserProfile {
            nickname: "Sam".to_string(),
            ..Default::default()
        };
        let prompt = system_prompt(&profile);

        assert!(prompt.contains("called Sam"));
        assert!(!prompt.contains("works as"));
        assert!(!prompt.contains("would like you to be"));
        assert!(!prompt.contains(NO_PREFERENCES));
    }

    #[test]
    fn test_system_prompt_empty_profile() {
        let prompt = system_prompt(&UserProfile::default());
        assert!(prompt.contains(NO_PREFERENCES));
    }

    #[test]
    fn test_conversation_order() {
        let history = vec![
            history_message(MessageRole::User, "first question"),
            history_message(MessageRole::Assistant, "first answer"),
        ];

        let conversation = build_conversation(&UserProfile::default(), &history, "next question");

        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation[0].role, ChatRole::System);
        assert_eq!(conversation[1].role, ChatRole::User);
        assert_eq!(conversation[1].content, "first question");
        assert_eq!(conversation[2].role, ChatRole::Assistant);
        assert_eq!(conversation[3].role, ChatRole::User);
        assert_eq!(conversation[3].content, "next question");
    }
}
