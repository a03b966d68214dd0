//! Password strength estimation and password entry callbacks.
//!
//! The estimator is pool-size based and deliberately conservative: every
//! character class that contributes at least one character widens the
//! assumed search space, repetition-heavy passwords are disqualified
//! outright, and the PBKDF iteration count is folded into the reported
//! level.

use std::sync::OnceLock;

use crate::signet::Signet;
use crate::JessError;

/// ASCII printable character classes (character codes 32-127).
const PASSWORD_CHAR_SETS: [&str; 5] = [
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "0123456789",
    // more common special characters, especially with passwords using words
    "- .,_",
    "!\"#$%&'()*+/:;<=>?@[\\]^`{|}~",
];

// Extended ASCII codes (character code 128-255): assume a pool size of 32
// (a quarter), as not all of them are common or easily accessible on every
// keyboard.
const PASSWORD_EXTRA_POOL_SIZE: usize = 32;

/// Callback asking the user to create a new password for a signet.
pub type CreatePasswordFn =
    dyn Fn(&mut Signet, i32) -> Result<(), JessError> + Send + Sync;
/// Callback asking the user for an existing password.
pub type GetPasswordFn = dyn Fn(&mut Signet) -> Result<(), JessError> + Send + Sync;

static CREATE_PASSWORD_CALLBACK: OnceLock<Box<CreatePasswordFn>> = OnceLock::new();
static GET_PASSWORD_CALLBACK: OnceLock<Box<GetPasswordFn>> = OnceLock::new();

/// Installs the callbacks used to let the user enter passwords.
///
/// Only the first call installs anything; later calls are ignored.
pub fn set_password_callbacks(
    create_password: Box<CreatePasswordFn>,
    get_password: Box<GetPasswordFn>,
) {
    let _ = CREATE_PASSWORD_CALLBACK.set(create_password);
    let _ = GET_PASSWORD_CALLBACK.set(get_password);
}

pub(crate) fn create_password_callback() -> Option<&'static CreatePasswordFn> {
    CREATE_PASSWORD_CALLBACK.get().map(|cb| cb.as_ref())
}

pub(crate) fn get_password_callback() -> Option<&'static GetPasswordFn> {
    GET_PASSWORD_CALLBACK.get().map(|cb| cb.as_ref())
}

/// Estimates the security level of a password under the given PBKDF
/// iteration count.
///
/// Returns `-1` for disqualified passwords: any single character making up
/// a quarter of the password, or too few distinct characters overall.
pub fn calculate_password_security_level(password: &str, iterations: u64) -> i32 {
    let length = password.len();
    if length == 0 {
        return -1;
    }

    let mut characters_found = 0usize;
    let mut distinct_characters_found = 0usize;
    let mut character_pool_size = 0usize;

    for char_set in PASSWORD_CHAR_SETS {
        let mut found_in_char_set = false;

        for set_char in char_set.chars() {
            let count = password.chars().filter(|c| *c == set_char).count();
            // Disqualify if a single character is 1/4 of the password.
            if count * 4 >= length {
                return -1;
            }
            if count > 0 {
                characters_found += count;
                distinct_characters_found += 1;
                found_in_char_set = true;
            }
        }

        if found_in_char_set {
            character_pool_size += char_set.len();
        }
    }

    // Disqualify if characters are repeated 4 or more times on average.
    if distinct_characters_found * 4 <= length {
        return -1;
    }

    // Characters outside the known classes widen the pool by a fixed amount.
    if characters_found < length {
        character_pool_size += PASSWORD_EXTRA_POOL_SIZE;
    }

    // Work in log space: entropy = len * log2(pool), halved for the average
    // guess, with the derivation cost folded in.
    let entropy = length as f64 * (character_pool_size as f64).log2();
    let security_level = entropy - 1.0 + (iterations as f64).log2();

    security_level as i32 // always round down
}

/// Returns the iteration count the strength estimator assumes for the given
/// password derivation tool.
pub fn password_iterations_for_tool(tool_name: &str) -> u64 {
    match tool_name {
        "SCRYPT-20" => 1 << 20,
        "PBKDF2-SHA2-256" => 20_000,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_at_least(password: &str, expected: i32) {
        let level = calculate_password_security_level(password, 20_000);
        assert!(
            level >= expected,
            "password {password:?}: got {level}, expected at least {expected}"
        );
    }

    #[test]
    fn weak_passwords_are_disqualified() {
        for password in [
            "asdf",
            "asdfasdf",
            "asdfasdxxxx",
            "asdfasdfasdf",
            "WgEKCp8c8{bPrG{Zo(Ms97pxaaaaaaaa",
            "aaaaaaaaAAAAAAAA00000000********",
        ] {
            assert_eq!(
                calculate_password_security_level(password, 20_000),
                -1,
                "password {password:?} should be disqualified"
            );
        }
    }

    #[test]
    fn letters_only() {
        expect_at_least("AVWHBwmF", 58);
        expect_at_least("AVWHBwmFGtLM", 81);
        expect_at_least("AVWHBwmFGtLMGhYfPkcyawfmZXRTQdxs", 195);
    }

    #[test]
    fn with_digits_and_specials() {
        expect_at_least("AVWHBwm1", 60);
        expect_at_least("AVWHBwmFGtL1", 84);
        expect_at_least("AVWHBw1_", 61);
        expect_at_least("AVWHBw1*", 65);
        expect_at_least("AVWHBwmFGtLMGhYfPkcyawfmZXRTQd1*", 221);
    }

    #[test]
    fn passphrases() {
        expect_at_least("WIw7,mstmsritt...", 116);
        expect_at_least("uTVM,TPw55:utvm,tpwstillsecure", 210);
        expect_at_least("galena-fighter-festival", 127);
        expect_at_least("forbade-momenta-spook-sure-devilish-wobbly", 221);
    }

    #[test]
    fn iterations_raise_the_level() {
        let low = calculate_password_security_level("AVWHBwm1", 20_000);
        let high = calculate_password_security_level("AVWHBwm1", 1 << 20);
        assert!(high > low);
        assert!(high >= 66);
    }

    #[test]
    fn tool_iteration_mapping() {
        assert_eq!(password_iterations_for_tool("SCRYPT-20"), 1 << 20);
        assert_eq!(password_iterations_for_tool("PBKDF2-SHA2-256"), 20_000);
        assert_eq!(password_iterations_for_tool("unknown"), 1);
    }
}
