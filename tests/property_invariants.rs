//! Property tests for the pure building blocks of dispatch

use keyrotor::cache::ResponseCache;
use keyrotor::dispatch::{MAX_TOKENS_LIMIT, SendOptions};
use keyrotor::fallback::FallbackResponder;
use keyrotor::upstream::{ChatMessage, FailureKind, classify};
use proptest::prelude::*;

proptest! {
    #[test]
    fn generation_options_stay_in_range(
        max_tokens in proptest::option::of(any::<f64>()),
        temperature in proptest::option::of(any::<f64>()),
        top_p in proptest::option::of(any::<f64>()),
    ) {
        let options = SendOptions {
            max_tokens,
            temperature,
            top_p,
            use_cache: None,
        };
        let generation = options.generation();

        prop_assert!((1..=MAX_TOKENS_LIMIT).contains(&generation.max_tokens));
        prop_assert!((0.0..=1.0).contains(&generation.temperature));
        prop_assert!((0.0..=1.0).contains(&generation.top_p));
    }

    #[test]
    fn rate_limit_status_is_transient_whatever_the_body(message in ".*") {
        prop_assert_eq!(classify(Some(429), &message), FailureKind::Transient);
    }

    #[test]
    fn cache_key_ignores_earlier_turns(
        earlier in proptest::collection::vec(".{0,40}", 0..5),
        latest in ".{0,80}",
        system_prompt in ".{0,120}",
    ) {
        let cache = ResponseCache::default();
        let mut long = Vec::new();
        for (i, text) in earlier.iter().enumerate() {
            if i % 2 == 0 {
                long.push(ChatMessage::user(text.clone()));
            } else {
                long.push(ChatMessage::assistant(text.clone()));
            }
        }
        long.push(ChatMessage::user(latest.clone()));
        let short = vec![ChatMessage::user(latest)];

        prop_assert_eq!(
            cache.key(&system_prompt, &long),
            cache.key(&system_prompt, &short)
        );
    }

    #[test]
    fn fallback_always_answers(text in ".{0,200}") {
        let reply = FallbackResponder::new().generate(&[ChatMessage::user(text)], "");
        prop_assert!(!reply.trim().is_empty());
    }
}
