//! One-shot CAPTCHA slots for the login form.
//!
//! Each pre-login browser gets a slot id (held in a cookie) that maps to the
//! expected answer. A login attempt takes the slot out of the table before
//! comparing, so a solved challenge is good for exactly one attempt.

use crate::access::constant_time_eq;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How long an unanswered challenge stays claimable.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on outstanding challenges. Past it the oldest slot is dropped.
pub const MAX_SLOTS: usize = 1024;

/// Characters used for answers. Omits look-alikes (0/O, 1/I/L).
const ANSWER_ALPHABET: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V',
    'W', 'X', 'Y', 'Z', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// A rendered challenge and the answer it expects.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub answer: String,
    pub body: Bytes,
    pub content_type: &'static str,
}

/// Produces challenges. Image rendering lives behind this seam.
pub trait ChallengeProvider: Send + Sync {
    fn generate(&self) -> Challenge;
}

/// Development provider: the challenge body is the answer in plain text.
#[derive(Debug, Clone)]
pub struct TextChallengeProvider {
    pub length: usize,
}

impl Default for TextChallengeProvider {
    fn default() -> Self {
        Self { length: 5 }
    }
}

impl ChallengeProvider for TextChallengeProvider {
    fn generate(&self) -> Challenge {
        let mut rng = rand::thread_rng();
        let answer: String = (0..self.length)
            .map(|_| ANSWER_ALPHABET[rng.gen_range(0..ANSWER_ALPHABET.len())])
            .collect();
        Challenge {
            body: Bytes::from(answer.clone()),
            answer,
            content_type: "text/plain; charset=utf-8",
        }
    }
}

struct Slot {
    answer: String,
    created_at: Instant,
    /// Insertion order, for shedding the oldest slot when full.
    seq: u64,
}

/// Table of outstanding challenges keyed by slot id.
///
/// Bounded by `capacity`: anonymous callers can mint slots, so the table
/// never holds more than that many, whatever the request rate.
pub struct CaptchaSlots {
    slots: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
    capacity: usize,
    next_seq: AtomicU64,
}

impl Default for CaptchaSlots {
    fn default() -> Self {
        Self::new(CHALLENGE_TTL)
    }
}

impl CaptchaSlots {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, MAX_SLOTS)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Store `answer` for `slot_id`, replacing any earlier challenge for the
    /// same browser. A full table first sheds stale slots, then the oldest.
    pub fn put(&self, slot_id: &str, answer: String) {
        let mut slots = self.slots.lock();
        if !slots.contains_key(slot_id) && slots.len() >= self.capacity {
            prune_stale(&mut slots, self.ttl);
            while slots.len() >= self.capacity {
                let Some(oldest) = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.seq)
                    .map(|(id, _)| id.clone())
                else {
                    break;
                };
                slots.remove(&oldest);
            }
        }
        slots.insert(
            slot_id.to_string(),
            Slot {
                answer,
                created_at: Instant::now(),
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    /// Consume the slot and check `submitted` against it (case-insensitive).
    /// The slot is gone afterwards whatever the outcome; stale slots are
    /// swept while the lock is held.
    pub fn verify(&self, slot_id: Option<&str>, submitted: Option<&str>) -> bool {
        let slot = {
            let mut slots = self.slots.lock();
            let slot = slot_id.and_then(|id| slots.remove(id));
            prune_stale(&mut slots, self.ttl);
            slot
        };
        let Some(slot) = slot else {
            return false;
        };
        if slot.created_at.elapsed() > self.ttl {
            return false;
        }
        let submitted = submitted.unwrap_or("").trim().to_ascii_uppercase();
        constant_time_eq(&submitted, &slot.answer.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune_stale(slots: &mut HashMap<String, Slot>, ttl: Duration) {
    slots.retain(|_, slot| slot.created_at.elapsed() <= ttl);
}

/// Fresh random slot id (128 bits, hex).
pub fn new_slot_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
