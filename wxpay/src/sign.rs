//! Canonical request signing.
//!
//! The gateway recomputes the signature independently, so the canonical
//! string must match byte for byte:
//!
//! 1. take every entry with a non-empty value, except `sign`;
//! 2. sort by key in byte order;
//! 3. join as `k1=v1&k2=v2&...`;
//! 4. append `&key=<secret>`;
//! 5. digest with MD5, or HMAC-SHA256 keyed with the secret;
//! 6. encode as uppercase hex.
//!
//! The same routine verifies gateway replies: recompute over the reply's
//! fields and compare with its `sign` field.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;

use crate::environment::Environment;
use crate::error::UnsupportedModeError;
use crate::params::{MCH_ID_FIELD, ParameterSet, SIGN_FIELD, SIGN_TYPE_FIELD};

type HmacSha256 = Hmac<Sha256>;

/// Digest algorithm used for the request signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SignType {
    /// `MD5`, the default when no `sign_type` field is sent.
    #[default]
    Md5,
    /// `HMAC-SHA256`, keyed with the API secret.
    HmacSha256,
}

impl SignType {
    /// Wire name of the algorithm, as sent in the `sign_type` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// Interprets a `sign_type` field value the way the gateway does:
    /// `HMAC-SHA256` selects HMAC, anything else (including empty) MD5.
    #[must_use]
    pub fn from_field(value: &str) -> Self {
        if value == Self::HmacSha256.as_str() {
            Self::HmacSha256
        } else {
            Self::Md5
        }
    }

    /// Reads the algorithm selected by the `sign_type` field of `params`.
    #[must_use]
    pub fn of(params: &ParameterSet) -> Self {
        Self::from_field(&params.get_string(SIGN_TYPE_FIELD))
    }
}

impl Display for SignType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown algorithm name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sign type `{0}`, expected MD5 or HMAC-SHA256")]
pub struct UnknownSignType(pub String);

impl FromStr for SignType {
    type Err = UnknownSignType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "HMAC-SHA256" | "HMAC_SHA256" => Ok(Self::HmacSha256),
            _ => Err(UnknownSignType(s.to_owned())),
        }
    }
}

/// Builds the string that is digested: sorted non-empty entries followed by
/// `key=<secret>`.
#[must_use]
pub fn canonical_string(params: &ParameterSet, secret: &str) -> String {
    let mut entries: Vec<(&str, String)> = params
        .iter()
        .filter(|(k, v)| *k != SIGN_FIELD && !v.is_empty())
        .map(|(k, v)| (k, v.to_string()))
        .collect();
    entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(key);
        out.push('=');
        out.push_str(&value);
        out.push('&');
    }
    out.push_str("key=");
    out.push_str(secret);
    out
}

/// Computes the uppercase-hex signature of `params` under `secret`.
///
/// Pure: identical inputs always yield the identical signature, and the
/// insertion order of `params` has no influence.
#[must_use]
pub fn compute_signature(params: &ParameterSet, secret: &str, sign_type: SignType) -> String {
    let input = canonical_string(params, secret);
    match sign_type {
        SignType::Md5 => hex::encode_upper(Md5::digest(input.as_bytes())),
        SignType::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(input.as_bytes());
            hex::encode_upper(mac.finalize().into_bytes())
        }
    }
}

/// Checks the `sign` field of `params` against a freshly computed signature.
///
/// Returns `false` when the field is absent.
#[must_use]
pub fn verify_signature(params: &ParameterSet, secret: &str, sign_type: SignType) -> bool {
    let claimed = params.get_string(SIGN_FIELD);
    !claimed.is_empty()
        && claimed.eq_ignore_ascii_case(&compute_signature(params, secret, sign_type))
}

/// Computes a sandbox signature.
///
/// The merchant id is added to the signable set before canonicalization and
/// only MD5 is accepted; `sandbox_key` is the key issued by the sandbox,
/// not the merchant's production secret.
///
/// # Errors
///
/// Returns [`UnsupportedModeError`] when `sign_type` is HMAC-SHA256.
pub fn sandbox_signature(
    params: &ParameterSet,
    mch_id: &str,
    sandbox_key: &str,
    sign_type: SignType,
) -> Result<String, UnsupportedModeError> {
    if sign_type != SignType::Md5 {
        return Err(UnsupportedModeError::new(
            "sign",
            Environment::Sandbox,
            "the sandbox only verifies MD5 signatures",
        ));
    }
    let mut signable = params.clone();
    signable.set(MCH_ID_FIELD, mch_id);
    Ok(compute_signature(&signable, sandbox_key, SignType::Md5))
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn field_set() -> impl Strategy<Value = Vec<(String, String)>> {
        proptest::collection::btree_map("[a-z_]{1,12}", "[A-Za-z0-9]{1,16}", 1..12)
            .prop_map(|m| m.into_iter().filter(|(k, _)| k != "sign").collect())
            .prop_filter("needs at least one field", |v: &Vec<_>| !v.is_empty())
    }

    fn algorithm() -> impl Strategy<Value = SignType> {
        prop_oneof![Just(SignType::Md5), Just(SignType::HmacSha256)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn insertion_order_is_irrelevant(
            fields in field_set(),
            secret in "[A-Za-z0-9]{8,32}",
            alg in algorithm(),
        ) {
            let forward: ParameterSet = fields.iter().cloned().collect();
            let backward: ParameterSet = fields.iter().rev().cloned().collect();
            prop_assert_eq!(
                compute_signature(&forward, &secret, alg),
                compute_signature(&backward, &secret, alg)
            );
        }

        #[test]
        fn empty_fields_do_not_change_signature(
            fields in field_set(),
            extra in "[a-z]{13,20}",
            secret in "[A-Za-z0-9]{8,32}",
            alg in algorithm(),
        ) {
            let base: ParameterSet = fields.into_iter().collect();
            let padded = base.clone().with(extra, "");
            prop_assert_eq!(
                compute_signature(&base, &secret, alg),
                compute_signature(&padded, &secret, alg)
            );
        }

        #[test]
        fn changing_a_value_changes_signature(
            fields in field_set(),
            pick in any::<prop::sample::Index>(),
            suffix in "[A-Za-z0-9]{1,4}",
            secret in "[A-Za-z0-9]{8,32}",
            alg in algorithm(),
        ) {
            let original: ParameterSet = fields.iter().cloned().collect();
            let (key, value) = &fields[pick.index(fields.len())];
            let mut perturbed = original.clone();
            perturbed.set(key.clone(), format!("{value}{suffix}"));
            prop_assert_ne!(
                compute_signature(&original, &secret, alg),
                compute_signature(&perturbed, &secret, alg)
            );
        }

        #[test]
        fn sign_then_verify_round_trip(
            fields in field_set(),
            secret in "[A-Za-z0-9]{8,32}",
            other in "[A-Za-z0-9]{8,32}",
            alg in algorithm(),
        ) {
            let mut params: ParameterSet = fields.into_iter().collect();
            let sign = compute_signature(&params, &secret, alg);
            params.set("sign", sign);
            prop_assert!(verify_signature(&params, &secret, alg));
            if other != secret {
                prop_assert!(!verify_signature(&params, &other, alg));
            }
        }
    }
}
