//! Pronounceable session id generation
//!
//! Ids are `adjective-animal` pairs such as `brave-otter`. A candidate is
//! rejected if it collides with the reserved admin path segment or with a
//! host that is currently online.

use rand::seq::SliceRandom;
use rand::Rng;

use super::HostRegistry;
use crate::types::HostId;

/// Path segment used by the admin routes; never handed out as a host id
pub const RESERVED_HOST_ID: &str = "admin";

const ADJECTIVES: &[&str] = &[
    "able", "amber", "ancient", "arctic", "azure", "bold", "brave", "breezy", "bright", "brisk",
    "calm", "candid", "cheerful", "clever", "cosmic", "crimson", "curious", "daring", "dapper",
    "eager", "early", "electric", "elegant", "fancy", "fearless", "festive", "fluffy", "frosty",
    "gentle", "giant", "glad", "golden", "graceful", "happy", "hardy", "hidden", "humble", "icy",
    "jolly", "jovial", "keen", "kind", "lively", "lucky", "lunar", "magic", "mellow", "merry",
    "mighty", "misty", "modest", "noble", "nimble", "olive", "patient", "plucky", "polite",
    "proud", "quick", "quiet", "rapid", "rustic", "scarlet", "shiny", "silent", "silver", "smooth",
    "solar", "spry", "steady", "stellar", "sunny", "swift", "tidy", "tranquil", "velvet", "vivid",
    "warm", "wild", "witty", "zesty",
];

const ANIMALS: &[&str] = &[
    "alpaca", "badger", "beaver", "bison", "bobcat", "buffalo", "camel", "caribou", "cheetah",
    "condor", "cougar", "coyote", "crane", "dingo", "dolphin", "eagle", "egret", "falcon",
    "ferret", "finch", "fox", "gazelle", "gecko", "gibbon", "gopher", "heron", "hyena", "ibis",
    "iguana", "impala", "jackal", "jaguar", "koala", "lemur", "leopard", "llama", "lynx",
    "magpie", "marmot", "marten", "meerkat", "mole", "moose", "narwhal", "newt", "ocelot",
    "octopus", "orca", "osprey", "otter", "owl", "panda", "panther", "parrot", "pelican",
    "penguin", "puffin", "quail", "rabbit", "raccoon", "raven", "robin", "salmon", "seal",
    "shark", "sloth", "sparrow", "squid", "stork", "swan", "tapir", "tiger", "toucan", "turtle",
    "urchin", "viper", "walrus", "weasel", "wombat", "yak", "zebra",
];

/// Produce a two-word id that is neither reserved nor currently online
pub fn generate_host_id(registry: &HostRegistry) -> HostId {
    let mut rng = rand::thread_rng();
    generate_from(|| random_slug(&mut rng), |candidate| {
        registry.is_online(&HostId::from(candidate))
    })
}

/// Draw one `adjective-animal` candidate
pub fn random_slug<R: Rng + ?Sized>(rng: &mut R) -> String {
    // Both lists are non-empty constants
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("brave");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("otter");
    format!("{}-{}", adjective, animal)
}

/// Retry `next_candidate` until it yields an acceptable id
fn generate_from<N, T>(mut next_candidate: N, is_taken: T) -> HostId
where
    N: FnMut() -> String,
    T: Fn(&str) -> bool,
{
    loop {
        let candidate = next_candidate();
        if candidate != RESERVED_HOST_ID && !is_taken(&candidate) {
            return HostId::from(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_slug_shape() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let slug = random_slug(&mut rng);
            let parts: Vec<&str> = slug.split('-').collect();
            assert_eq!(parts.len(), 2, "unexpected slug {}", slug);
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(ANIMALS.contains(&parts[1]));
        }
    }

    #[test]
    fn test_combination_space_is_large() {
        assert!(ADJECTIVES.len() * ANIMALS.len() >= 4000);
    }

    #[test]
    fn test_skips_reserved_and_taken() {
        let mut candidates = vec!["admin", "brave-otter", "quiet-heron"].into_iter();
        let id = generate_from(
            || candidates.next().unwrap().to_string(),
            |c| c == "brave-otter",
        );
        assert_eq!(id, HostId::from("quiet-heron"));
    }

    #[test]
    fn test_never_returns_live_host() {
        let registry = Arc::new(HostRegistry::new());
        let live = HostId::from("brave-otter");
        let _session = registry.register(live.clone());

        let ids: HashSet<HostId> = (0..500).map(|_| generate_host_id(&registry)).collect();
        assert!(!ids.contains(&live));
        assert!(!ids.contains(&HostId::from(RESERVED_HOST_ID)));
        // Repeated calls spread across the space
        assert!(ids.len() > 1);
    }
}
