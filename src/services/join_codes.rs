//! Join and audience code generation.
//!
//! Team codes are 8 characters from Crockford's Base32 alphabet so they can be read aloud and
//! typed without ambiguity. Audience codes are longer URL-safe tokens.

use rand::Rng;

use crate::dao::{
    game_store::StoreTxn,
    storage::{EntityKind, StorageError, StorageResult},
};

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U
const URL_SAFE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Length of a team join code.
pub const TEAM_CODE_LEN: usize = 8;
/// Length of an audience code.
pub const AUDIENCE_CODE_LEN: usize = 22;
const MAX_ATTEMPTS: usize = 16;

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// Generate a team join code.
pub fn generate_team_code() -> String {
    random_string(CROCKFORD, TEAM_CODE_LEN)
}

/// Generate an audience code.
pub fn generate_audience_code() -> String {
    random_string(URL_SAFE, AUDIENCE_CODE_LEN)
}

/// Draw codes from `generate` until one is neither stored nor in `reserved`.
pub async fn unique_code(
    txn: &mut dyn StoreTxn,
    reserved: &[String],
    generate: fn() -> String,
) -> StorageResult<String> {
    for _ in 0..MAX_ATTEMPTS {
        let code = generate();
        if reserved.contains(&code) {
            continue;
        }
        if !txn.is_code_taken(code.clone()).await? {
            return Ok(code);
        }
    }
    Err(StorageError::conflict(
        EntityKind::Game,
        "could not draw an unused join code",
    ))
}
