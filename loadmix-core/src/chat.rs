use rand::Rng;
use serde::{Deserialize, Serialize};

const TOPICS: &[&str] = &[
    "Tell me about artificial intelligence",
    "Explain quantum computing in simple terms",
    "What are the benefits of renewable energy?",
    "How does machine learning work?",
    "Describe the process of photosynthesis",
    "What is the history of the internet?",
    "Explain the concept of blockchain technology",
    "How do neural networks function?",
    "What are the principles of sustainable development?",
    "Describe the structure of DNA",
];

const MULTI_TURN_SYSTEM: &str = "You are a helpful assistant that provides clear and concise answers.";
const MULTI_TURN_ASSISTANT: &str =
    "I'd be happy to help you with that topic. Let me provide you with some information.";
const LONG_CONVERSATION_SYSTEM: &str =
    "You are a knowledgeable assistant helping with detailed explanations.";
const LONG_CONVERSATION_TURNS: usize = 5;

/// JSON body of a chat-completions request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ChatFileRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFileRef {
    pub id: String,
    pub name: String,
}

/// Conversation shapes a chat generator can produce.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChatShape {
    Basic,
    MultiTurn,
    LongConversation,
    Streaming,
    WithFiles,
    Concurrent,
    MixedModel,
}

impl ChatShape {
    /// Builds one request. `models` must be non-empty; the driver validates this up front.
    pub fn build<R: Rng + ?Sized>(self, models: &[String], rng: &mut R) -> ChatRequest {
        let model = if models.is_empty() {
            String::new()
        } else {
            models[rng.gen_range(0..models.len())].clone()
        };
        let topic = TOPICS[rng.gen_range(0..TOPICS.len())];

        match self {
            Self::Basic => ChatRequest {
                model,
                messages: vec![ChatMessage::new("user", topic)],
                stream: false,
                temperature: 0.7,
                max_tokens: 150,
                files: Vec::new(),
            },
            Self::MultiTurn => ChatRequest {
                model,
                messages: vec![
                    ChatMessage::new("system", MULTI_TURN_SYSTEM),
                    ChatMessage::new("user", topic),
                    ChatMessage::new("assistant", MULTI_TURN_ASSISTANT),
                    ChatMessage::new("user", follow_up(topic, rng)),
                ],
                stream: false,
                temperature: 0.7,
                max_tokens: 200,
                files: Vec::new(),
            },
            Self::LongConversation => {
                let mut messages = vec![
                    ChatMessage::new("system", LONG_CONVERSATION_SYSTEM),
                    ChatMessage::new("user", topic),
                ];
                for turn in 1..=LONG_CONVERSATION_TURNS {
                    messages.push(ChatMessage::new(
                        "assistant",
                        format!("This is response {turn} providing information about the topic."),
                    ));
                    messages.push(ChatMessage::new("user", follow_up(topic, rng)));
                }
                ChatRequest {
                    model,
                    messages,
                    stream: false,
                    temperature: 0.5,
                    max_tokens: 300,
                    files: Vec::new(),
                }
            }
            Self::Streaming => ChatRequest {
                model,
                messages: vec![ChatMessage::new(
                    "user",
                    format!("Please provide a detailed explanation of: {topic}"),
                )],
                stream: true,
                temperature: 0.7,
                max_tokens: 500,
                files: Vec::new(),
            },
            Self::WithFiles => ChatRequest {
                model,
                messages: vec![ChatMessage::new(
                    "user",
                    format!("Based on the uploaded documents, please explain: {topic}"),
                )],
                stream: false,
                temperature: 0.6,
                max_tokens: 250,
                files: vec![
                    ChatFileRef {
                        id: "file_123".to_string(),
                        name: "document.pdf".to_string(),
                    },
                    ChatFileRef {
                        id: "file_456".to_string(),
                        name: "data.txt".to_string(),
                    },
                ],
            },
            Self::Concurrent => ChatRequest {
                model,
                messages: vec![ChatMessage::new("user", topic)],
                stream: false,
                temperature: 0.8,
                max_tokens: 100,
                files: Vec::new(),
            },
            Self::MixedModel => ChatRequest {
                model,
                messages: vec![ChatMessage::new("user", topic)],
                stream: rng.gen_bool(0.5),
                temperature: rng.gen_range(0.1..1.0),
                max_tokens: rng.gen_range(100..=400),
                files: Vec::new(),
            },
        }
    }
}

fn follow_up<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    match rng.gen_range(0..5) {
        0 => format!("Can you provide more details about {topic}?"),
        1 => format!("What are the practical applications of {topic}?"),
        2 => format!("How has {topic} evolved over time?"),
        3 => format!("What are the challenges related to {topic}?"),
        _ => format!("Can you give examples of {topic} in real life?"),
    }
}
