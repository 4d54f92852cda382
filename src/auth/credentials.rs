//! Password verification across stored hash formats
//!
//! The admin table holds hashes written by different tools over time, so the
//! format is sniffed per record. [`SCHEMES`] is tried in order; the first
//! scheme that can parse the record decides the outcome. A scheme that cannot
//! parse the record hands it to the next one.
//!
//! Supported encodings:
//! - passlib `$pbkdf2-sha256$<rounds>$<ab64 salt>$<ab64 checksum>`
//! - PHC strings: `$pbkdf2-sha256$i=..,l=..$..`, `$scrypt$..`, `$argon2id$..`
//! - werkzeug `pbkdf2:<digest>[:<iterations>]$<salt>$<hex>` and
//!   `scrypt[:<n>:<r>:<p>]$<salt>$<hex>`
//! - plaintext, accepted with a warning

use argon2::password_hash::{self, PasswordHash, PasswordVerifier};
use argon2::Argon2;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use pbkdf2::{pbkdf2_hmac, Pbkdf2};
use rand::rngs::OsRng;
use rand::RngCore;
use scrypt::Scrypt;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

/// passlib's default for `pbkdf2_sha256`
pub const DEFAULT_PBKDF2_ROUNDS: u32 = 29000;

const PASSLIB_PBKDF2_PREFIX: &str = "$pbkdf2-sha256$";
const SALT_BYTES: usize = 16;
const PBKDF2_KEY_BYTES: usize = 32;

// werkzeug defaults when the method string omits parameters
const WERKZEUG_PBKDF2_ITERATIONS: u32 = 600_000;
const WERKZEUG_SCRYPT_N: u64 = 1 << 15;
const WERKZEUG_SCRYPT_R: u32 = 8;
const WERKZEUG_SCRYPT_P: u32 = 1;
const WERKZEUG_SCRYPT_KEY_BYTES: usize = 64;

/// Standard base64 alphabet, unpadded, tolerant of padding and trailing bits.
/// passlib's "ab64" is this with `.` in place of `+`.
const AB64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Error returned when producing a new hash fails
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HashError {
    #[error("Hash failed: {0}")]
    HashFailed(String),
}

/// Why a scheme could not read a stored record
#[derive(Debug, Error)]
enum FormatError {
    #[error("malformed record: {0}")]
    Malformed(&'static str),

    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("unsupported parameters: {0}")]
    Params(String),

    #[error("PHC string rejected: {0}")]
    Phc(password_hash::Error),
}

struct Scheme {
    name: &'static str,
    matches: fn(&str) -> bool,
    verify: fn(&str, &str) -> Result<bool, FormatError>,
}

static SCHEMES: &[Scheme] = &[
    Scheme {
        name: "pbkdf2-sha256",
        matches: |stored| stored.starts_with(PASSLIB_PBKDF2_PREFIX),
        verify: verify_pbkdf2_sha256,
    },
    Scheme {
        name: "scrypt",
        matches: |stored| stored.starts_with("$scrypt$") || stored.starts_with("scrypt"),
        verify: verify_scrypt,
    },
    Scheme {
        name: "generic",
        matches: |stored| {
            stored.starts_with('$') || stored.starts_with("pbkdf2:") || stored.starts_with("scrypt")
        },
        verify: verify_generic,
    },
    Scheme {
        name: "plaintext",
        matches: |_| true,
        verify: verify_plaintext,
    },
];

/// Check `plaintext` against a stored credential
///
/// Returns `false` for a missing record, a mismatch, or a record no scheme
/// can read. Never panics.
pub fn verify_password(plaintext: &str, stored: Option<&str>) -> bool {
    let stored = match stored {
        Some(s) if !s.is_empty() => s,
        _ => return false,
    };

    for scheme in SCHEMES {
        if !(scheme.matches)(stored) {
            continue;
        }
        match (scheme.verify)(plaintext, stored) {
            Ok(matched) => return matched,
            Err(e) => {
                debug!(scheme = scheme.name, error = %e, "Stored hash not readable by scheme");
            }
        }
    }

    false
}

/// Hash a password in passlib's `pbkdf2_sha256` format
pub fn hash_password(plaintext: &str, rounds: u32) -> Result<String, HashError> {
    if rounds == 0 {
        return Err(HashError::HashFailed("rounds must be positive".to_string()));
    }

    let mut salt = [0u8; SALT_BYTES];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| HashError::HashFailed(e.to_string()))?;

    let mut key = [0u8; PBKDF2_KEY_BYTES];
    pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, rounds, &mut key);

    Ok(format!(
        "{}{}${}${}",
        PASSLIB_PBKDF2_PREFIX,
        rounds,
        ab64_encode(&salt),
        ab64_encode(&key)
    ))
}

fn verify_pbkdf2_sha256(plaintext: &str, stored: &str) -> Result<bool, FormatError> {
    let body = stored
        .strip_prefix(PASSLIB_PBKDF2_PREFIX)
        .ok_or(FormatError::Malformed("missing prefix"))?;

    let fields: Vec<&str> = body.split('$').collect();
    let [rounds, salt, checksum] = fields[..] else {
        return Err(FormatError::Malformed("expected rounds$salt$checksum"));
    };

    // PHC variant: `i=<rounds>,l=<len>`
    if rounds.contains('=') {
        return verify_phc(plaintext, stored, &[&Pbkdf2]);
    }

    let rounds: u32 = rounds
        .parse()
        .map_err(|_| FormatError::Malformed("rounds is not a number"))?;
    if rounds == 0 {
        return Err(FormatError::Params("zero rounds".to_string()));
    }

    let salt = ab64_decode(salt)?;
    let expected = ab64_decode(checksum)?;
    if expected.is_empty() {
        return Err(FormatError::Malformed("empty checksum"));
    }

    let mut derived = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, rounds, &mut derived);

    Ok(constant_time_eq(&derived, &expected))
}

fn verify_scrypt(plaintext: &str, stored: &str) -> Result<bool, FormatError> {
    if stored.starts_with("$scrypt$") {
        verify_phc(plaintext, stored, &[&Scrypt])
    } else {
        verify_werkzeug(plaintext, stored)
    }
}

fn verify_generic(plaintext: &str, stored: &str) -> Result<bool, FormatError> {
    if stored.starts_with('$') {
        verify_phc(plaintext, stored, &[&Argon2::default(), &Pbkdf2, &Scrypt])
    } else {
        verify_werkzeug(plaintext, stored)
    }
}

fn verify_plaintext(plaintext: &str, stored: &str) -> Result<bool, FormatError> {
    let matched = constant_time_eq(plaintext.as_bytes(), stored.as_bytes());
    if matched {
        warn!("Password stored in plaintext; rehash this credential");
    }
    Ok(matched)
}

fn verify_phc(
    plaintext: &str,
    stored: &str,
    verifiers: &[&dyn PasswordVerifier],
) -> Result<bool, FormatError> {
    let hash = PasswordHash::new(stored).map_err(FormatError::Phc)?;
    match hash.verify_password(verifiers, plaintext) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(FormatError::Phc(e)),
    }
}

/// werkzeug `method$salt$hexdigest`; the salt is used as UTF-8 bytes
fn verify_werkzeug(plaintext: &str, stored: &str) -> Result<bool, FormatError> {
    let mut fields = stored.splitn(3, '$');
    let (method, salt, digest) = match (fields.next(), fields.next(), fields.next()) {
        (Some(m), Some(s), Some(d)) => (m, s, d),
        _ => return Err(FormatError::Malformed("expected method$salt$hash")),
    };

    let expected = hex::decode(digest).map_err(|e| FormatError::Encoding(e.to_string()))?;
    if expected.is_empty() {
        return Err(FormatError::Malformed("empty digest"));
    }

    let mut params = method.split(':');
    let derived = match params.next() {
        Some("pbkdf2") => {
            let digest_name = params.next().unwrap_or("sha256");
            let iterations = parse_or(params.next(), WERKZEUG_PBKDF2_ITERATIONS)?;
            if iterations == 0 {
                return Err(FormatError::Params("zero iterations".to_string()));
            }

            let mut out = vec![0u8; expected.len()];
            match digest_name {
                "sha256" => {
                    pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), salt.as_bytes(), iterations, &mut out)
                }
                "sha512" => {
                    pbkdf2_hmac::<Sha512>(plaintext.as_bytes(), salt.as_bytes(), iterations, &mut out)
                }
                other => return Err(FormatError::Params(format!("digest {}", other))),
            }
            out
        }
        Some("scrypt") => {
            let n = parse_or(params.next(), WERKZEUG_SCRYPT_N)?;
            let r = parse_or(params.next(), WERKZEUG_SCRYPT_R)?;
            let p = parse_or(params.next(), WERKZEUG_SCRYPT_P)?;
            if n < 2 || !n.is_power_of_two() {
                return Err(FormatError::Params(format!("scrypt n={}", n)));
            }

            let log_n = n.trailing_zeros() as u8;
            let scrypt_params = scrypt::Params::new(log_n, r, p, WERKZEUG_SCRYPT_KEY_BYTES)
                .map_err(|e| FormatError::Params(e.to_string()))?;

            let mut out = vec![0u8; expected.len()];
            scrypt::scrypt(plaintext.as_bytes(), salt.as_bytes(), &scrypt_params, &mut out)
                .map_err(|e| FormatError::Params(e.to_string()))?;
            out
        }
        _ => return Err(FormatError::Malformed("unknown werkzeug method")),
    };

    Ok(constant_time_eq(&derived, &expected))
}

fn parse_or<T: std::str::FromStr>(field: Option<&str>, default: T) -> Result<T, FormatError> {
    match field {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| FormatError::Malformed("non-numeric parameter")),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

fn ab64_encode(bytes: &[u8]) -> String {
    AB64.encode(bytes).replace('+', ".")
}

fn ab64_decode(value: &str) -> Result<Vec<u8>, FormatError> {
    AB64.decode(value.replace('.', "+"))
        .map_err(|e| FormatError::Encoding(e.to_string()))
}
