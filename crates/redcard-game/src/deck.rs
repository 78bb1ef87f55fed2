//! Card decks: the built-in set and JSON deck files.
//!
//! A deck file looks like `{"red": ["prompt", ...], "white": ["answer", ...]}`.
//! Card text is the card's identity, so duplicates are dropped on load.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors loading a deck file.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    /// File could not be read.
    #[error("deck io error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a valid deck document.
    #[error("deck json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Deck has no red or no white cards.
    #[error("deck must contain at least one red and one white card")]
    Empty,
}

/// Immutable card template shared by every session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    red: Vec<String>,
    white: Vec<String>,
}

impl Deck {
    /// Build a deck, trimming blank cards and dropping duplicates.
    pub fn new(red: Vec<String>, white: Vec<String>) -> Result<Self, DeckError> {
        let red = dedup(red);
        let white = dedup(white);
        if red.is_empty() || white.is_empty() {
            return Err(DeckError::Empty);
        }
        Ok(Self { red, white })
    }

    /// Parse a JSON deck document.
    pub fn from_json(text: &str) -> Result<Self, DeckError> {
        let raw: Self = serde_json::from_str(text)?;
        Self::new(raw.red, raw.white)
    }

    /// Load a JSON deck file.
    pub fn load(path: &Path) -> Result<Self, DeckError> {
        let text = std::fs::read_to_string(path)?;
        let deck = Self::from_json(&text)?;
        debug!(?path, red = deck.red.len(), white = deck.white.len(), "loaded deck");
        Ok(deck)
    }

    /// The deck compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            red: BUILTIN_RED.iter().map(|s| (*s).to_string()).collect(),
            white: BUILTIN_WHITE.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Prompt cards.
    pub fn red(&self) -> &[String] {
        &self.red
    }

    /// Answer cards.
    pub fn white(&self) -> &[String] {
        &self.white
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::builtin()
    }
}

fn dedup(cards: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    cards
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

const BUILTIN_RED: &[&str] = &[
    "The secret ingredient in grandma's soup is ____.",
    "My superpower would be ____.",
    "Nobody expected the wedding toast to mention ____.",
    "The new museum exhibit is entirely about ____.",
    "I was late to work because of ____.",
    "The scientists were shocked to discover ____.",
    "My therapist says I need to stop thinking about ____.",
    "The next big fitness trend: ____.",
    "What's in the box?",
    "The hotel's five-star amenity is ____.",
    "The real reason the dinosaurs went extinct: ____.",
    "Tonight's dinner special is ____.",
    "In the sequel, the hero must defeat ____.",
    "The office party got weird after ____.",
    "My autobiography will be called ____.",
    "What did the astronauts find on the moon?",
    "The worst thing to say on a first date is ____.",
    "Coming soon to a theater near you: ____.",
    "The village elders warned us about ____.",
    "What keeps the cat up at night?",
    "The last thing I googled was ____.",
    "The mayor's new policy bans ____.",
    "Breaking news: local man arrested for ____.",
    "The treasure chest contained nothing but ____.",
];

const BUILTIN_WHITE: &[&str] = &[
    "A suspiciously large spoon.",
    "Interpretive dance.",
    "A haunted vending machine.",
    "Three raccoons in a trench coat.",
    "The smell of burnt toast.",
    "A motivational llama.",
    "An unpaid parking ticket.",
    "Competitive napping.",
    "A very confident pigeon.",
    "Grandpa's conspiracy theories.",
    "The group chat.",
    "A bucket of lukewarm gravy.",
    "Accidentally replying all.",
    "Socks with sandals.",
    "A tiny violin.",
    "Emotional support cactus.",
    "The last slice of pizza.",
    "A mysterious rash.",
    "Yodeling lessons.",
    "An entire wheel of cheese.",
    "Pretending to be busy.",
    "A goat in a business suit.",
    "The Wi-Fi password.",
    "Karaoke night gone wrong.",
    "A sentient houseplant.",
    "Forgetting someone's name mid-conversation.",
    "Glitter. So much glitter.",
    "An awkward high five.",
    "A pirate with stage fright.",
    "Free samples.",
    "The neighbor's leaf blower.",
    "A medieval jousting tournament.",
    "Unsolicited advice.",
    "Mom's spaghetti.",
    "A dramatic slow clap.",
    "The snooze button.",
    "Extreme couponing.",
    "A self-help book for dogs.",
    "Inflatable tube men.",
    "A surprise audit.",
    "The floor is lava.",
    "A keyboard full of crumbs.",
    "Bad puns.",
    "A skeleton playing the trombone.",
    "The Monday morning meeting.",
    "An overly friendly ghost.",
    "Pineapple on pizza.",
    "A cursed family heirloom.",
    "Dad jokes.",
    "A rubber duck debugging session.",
    "Elevator small talk.",
    "A llama with a grudge.",
    "Sweatpants at a gala.",
    "A rogue shopping cart.",
    "Buffering.",
    "A pocket full of sand.",
    "Lukewarm coffee.",
    "A dramatic reading of the terms and conditions.",
    "The world's smallest horse.",
    "A kazoo solo.",
    "Running out of toilet paper.",
    "A questionable tattoo.",
    "An intern with a flamethrower.",
    "Spontaneous combustion.",
    "A wizard who only knows one spell.",
    "Aggressive mimes.",
    "The tax return.",
    "A flock of angry geese.",
    "Tap dancing on the ceiling.",
    "A disco ball.",
    "A haunted spreadsheet.",
    "Oversharing at brunch.",
    "A banana peel, strategically placed.",
    "A hamster on a treadmill.",
    "A very long receipt.",
    "The reply guy.",
    "A robot learning to love.",
    "Double-dipping.",
    "A parade of corgis.",
    "Stepping on a Lego.",
    "Tuba practice at 6 AM.",
    "A moustache made of cheese.",
    "The crunchy leaves of autumn.",
    "An exploding birthday cake.",
    "A villain monologue.",
];
