//! Deterministic fallback responder
//!
//! Used only when no upstream provider can be reached. Picks a pre-written
//! paragraph from keyword matches on the latest user message so the caller
//! still gets a sensible answer while the pool is degraded.

use crate::upstream::ChatMessage;

/// Model name reported for fallback answers
pub const FALLBACK_MODEL: &str = "fallback";

const GREETING_KEYWORDS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

const PRICE_KEYWORDS: &[&str] = &[
    "price",
    "prices",
    "cost",
    "costs",
    "how much",
    "rent",
    "budget",
    "cheap",
    "expensive",
    "fee",
    "fees",
    "deposit",
    "pay",
];

const LOCATION_KEYWORDS: &[&str] = &[
    "area",
    "areas",
    "location",
    "located",
    "where",
    "neighborhood",
    "neighbourhood",
    "district",
    "near",
    "city",
    "downtown",
];

const PROPERTY_KEYWORDS: &[&str] = &[
    "apartment",
    "apartments",
    "flat",
    "flats",
    "house",
    "houses",
    "property",
    "properties",
    "room",
    "rooms",
    "studio",
    "villa",
    "listing",
    "listings",
    "booking",
    "book",
];

const GREETING_REPLY: &str = "Hello! I'm here to help you find a place to stay. \
Tell me what kind of property you are looking for, your budget and the area you prefer, \
and I'll point you to the most suitable listings.";

const PRICE_REPLY: &str = "Prices depend on the property type, its size, the area and \
the length of your stay. Each listing shows its current nightly or monthly rate along with \
any deposit or service fees. If you share your budget, you can filter the listings to see \
only the options that fit it.";

const LOCATION_REPLY: &str = "We have properties in several neighborhoods, from central \
districts close to shops and transport to quieter residential areas. Every listing shows its \
location on the map, so you can compare distances to the places that matter to you.";

const PROPERTY_REPLY: &str = "You can browse apartments, studios, rooms and houses in the \
listings section. Each property page has photos, amenities, availability and house rules. \
When you find one you like, you can send a booking request directly from its page.";

const DEFAULT_REPLY: &str = "Thanks for your message! Our assistant is temporarily \
running in a limited mode. You can still browse the listings, check prices and availability, \
and contact a host directly from any property page. Please try asking again in a few minutes.";

/// Which canned answer was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTopic {
    Greeting,
    Price,
    Location,
    Property,
    General,
}

impl FallbackTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Price => "price",
            Self::Location => "location",
            Self::Property => "property",
            Self::General => "general",
        }
    }

    fn reply(&self) -> &'static str {
        match self {
            Self::Greeting => GREETING_REPLY,
            Self::Price => PRICE_REPLY,
            Self::Location => LOCATION_REPLY,
            Self::Property => PROPERTY_REPLY,
            Self::General => DEFAULT_REPLY,
        }
    }
}

/// Keyword-driven canned responder
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResponder;

impl FallbackResponder {
    pub fn new() -> Self {
        Self
    }

    /// Produce the fallback text for a conversation
    pub fn generate(&self, messages: &[ChatMessage], system_prompt: &str) -> String {
        let topic = self.topic(messages);
        tracing::debug!(
            topic = topic.as_str(),
            system_prompt_length = system_prompt.len(),
            "Generated fallback response"
        );
        topic.reply().to_string()
    }

    /// Classify the latest user message into a fallback topic
    ///
    /// Topics are checked in a fixed order: greeting, price, location, property.
    pub fn topic(&self, messages: &[ChatMessage]) -> FallbackTopic {
        let latest = messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let normalized = normalize(latest);

        [
            (GREETING_KEYWORDS, FallbackTopic::Greeting),
            (PRICE_KEYWORDS, FallbackTopic::Price),
            (LOCATION_KEYWORDS, FallbackTopic::Location),
            (PROPERTY_KEYWORDS, FallbackTopic::Property),
        ]
        .into_iter()
        .find(|(keywords, _)| contains_any(&normalized, keywords))
        .map(|(_, topic)| topic)
        .unwrap_or(FallbackTopic::General)
    }
}

/// Lower-case, collapse punctuation to single spaces and pad both ends
///
/// Padding lets whole-word and multi-word keywords match with one `contains`.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_any(normalized: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|keyword| normalized.contains(&format!(" {} ", keyword)))
}
