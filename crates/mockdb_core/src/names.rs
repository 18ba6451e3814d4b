use rand::seq::SliceRandom;
use rand::Rng;

/// Produces scraper names for jobs created without one.
pub trait NameGenerator {
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "dusty", "eager", "fuzzy", "gentle", "hollow", "ivory", "jolly",
    "keen", "lucky", "mellow", "nimble", "quiet", "rapid", "silent", "tidy", "vivid", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "canyon", "delta", "falcon", "garden", "harbor", "island", "jungle", "lantern",
    "meadow", "orchard", "pebble", "quarry", "river", "summit", "tunnel", "valley", "willow",
];

/// Random `adjective-noun-NNN` slugs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSlugGenerator;

impl NameGenerator for RandomSlugGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("plain");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("scraper");
        let suffix: u16 = rng.gen_range(100..1000);
        format!("{adjective}-{noun}-{suffix}")
    }
}

/// Always returns the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedNameGenerator(pub String);

impl NameGenerator for FixedNameGenerator {
    fn generate(&self) -> String {
        self.0.clone()
    }
}
