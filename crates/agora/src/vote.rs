//! Thread votes.
//!
//! One vote row per (author, thread). A repeated vote replaces the stored
//! voice, and the thread score is always recomputed as the sum of the rows
//! rather than adjusted incrementally.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::ThreadId;

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Voice {
    Down,
    Up,
}

impl Voice {
    pub fn value(self) -> i32 {
        match self {
            Voice::Down => -1,
            Voice::Up => 1,
        }
    }
}

impl TryFrom<i32> for Voice {
    type Error = Error;

    fn try_from(voice: i32) -> Result<Self, Self::Error> {
        match voice {
            -1 => Ok(Voice::Down),
            1 => Ok(Voice::Up),
            other => Err(Error::InvalidVoice(other)),
        }
    }
}

impl From<Voice> for i32 {
    fn from(voice: Voice) -> Self {
        voice.value()
    }
}

/// In-process vote table keyed by (thread, author).
#[derive(Debug, Default)]
pub struct Ballots {
    votes: HashMap<(ThreadId, String), Voice>,
}

impl Ballots {
    /// Record `voice` for `author` on `thread`, replacing any earlier vote,
    /// and return the thread's recomputed score.
    pub fn cast(&mut self, thread: ThreadId, author: &str, voice: Voice) -> i64 {
        self.votes.insert((thread, author.to_owned()), voice);
        self.score(thread)
    }

    /// Sum of every voice on `thread`.
    pub fn score(&self, thread: ThreadId) -> i64 {
        self.votes
            .iter()
            .filter(|((t, _), _)| *t == thread)
            .map(|(_, voice)| i64::from(voice.value()))
            .sum()
    }

    /// Number of vote rows on `thread`.
    pub fn rows(&self, thread: ThreadId) -> usize {
        self.votes.keys().filter(|(t, _)| *t == thread).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_voice_bounds() {
        assert_eq!(Voice::try_from(1).unwrap(), Voice::Up);
        assert_eq!(Voice::try_from(-1).unwrap(), Voice::Down);
        assert!(matches!(Voice::try_from(0), Err(Error::InvalidVoice(0))));
        assert!(matches!(Voice::try_from(2), Err(Error::InvalidVoice(2))));
    }

    #[test]
    fn test_revote_replaces() {
        let mut ballots = Ballots::default();
        assert_eq!(ballots.cast(1, "a", Voice::Up), 1);
        assert_eq!(ballots.cast(1, "a", Voice::Down), -1);
        assert_eq!(ballots.rows(1), 1);
    }

    #[test]
    fn test_threads_are_independent() {
        let mut ballots = Ballots::default();
        ballots.cast(1, "a", Voice::Up);
        ballots.cast(2, "a", Voice::Down);
        ballots.cast(2, "b", Voice::Down);
        assert_eq!(ballots.score(1), 1);
        assert_eq!(ballots.score(2), -2);
    }

    #[test]
    fn test_voice_serde_is_numeric() {
        assert_eq!(serde_json::to_string(&Voice::Down).unwrap(), "-1");
        assert_eq!(serde_json::from_str::<Voice>("1").unwrap(), Voice::Up);
        assert!(serde_json::from_str::<Voice>("3").is_err());
    }

    proptest! {
        #[test]
        fn prop_score_is_sum_of_latest_votes(
            votes in proptest::collection::vec((0u8..5, prop::bool::ANY), 0..40)
        ) {
            let mut ballots = Ballots::default();
            let mut latest: HashMap<u8, i64> = HashMap::new();
            for (author, up) in votes {
                let voice = if up { Voice::Up } else { Voice::Down };
                let score = ballots.cast(1, &format!("user{author}"), voice);
                latest.insert(author, i64::from(voice.value()));
                prop_assert_eq!(score, latest.values().sum::<i64>());
            }
            prop_assert_eq!(ballots.rows(1), latest.len());
        }
    }
}
