//! Credential bundle for one persisted identity.
//!
//! The bundle is created once, when no stored credentials exist, and is then
//! mutated in place by the protocol client and flushed through the write
//! queue. Field names match the camelCase layout protocol clients expect so
//! stored documents stay readable by other tooling.
//!
//! Fields this crate does not know about (the client adds `me`, pairing state,
//! and so on after login) are kept in [`AuthenticationCreds::extra`] and
//! written back untouched.

use crate::serialization::{CodecError, Value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Registration ids are 14-bit.
pub const REGISTRATION_ID_MASK: u16 = 0x3fff;

/// Signal's key-type prefix for Curve25519 public keys.
const DJB_KEY_TYPE: u8 = 0x05;

const DEFAULT_STATUS_TEMPLATE: &str = "Hey there! I'm using credstore.";
const DEFAULT_ACCOUNT_DETAILS: &str = "credstore";
const DEFAULT_PLATFORM: &str = "android";

const KNOWN_FIELDS: &[&str] = &[
    "noiseKey",
    "signedIdentityKey",
    "signedPreKey",
    "registrationId",
    "advSecretKey",
    "processedHistoryMessages",
    "nextPreKeyId",
    "firstUnuploadedPreKeyId",
    "accountSettings",
    "account",
    "deviceId",
    "phoneId",
    "identityId",
    "registered",
    "backupToken",
    "createdAt",
];

/// A Curve25519 key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(&self.public))
            .field("private", &"<redacted>")
            .finish()
    }
}

impl KeyPair {
    /// Fresh random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::from(random_bytes::<32>());
        let public = PublicKey::from(&secret);
        Self {
            public: public.as_bytes().to_vec(),
            private: secret.to_bytes().to_vec(),
        }
    }

    fn to_value(&self) -> Value {
        Value::object([
            ("public", Value::from(self.public.clone())),
            ("private", Value::from(self.private.clone())),
        ])
    }

    fn from_value(value: &Value, field: &str) -> Result<Self, CodecError> {
        let fields = object(value, field)?;
        Ok(Self {
            public: required_bytes(fields, "public", field)?,
            private: required_bytes(fields, "private", field)?,
        })
    }
}

/// A key pair signed by the identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedKeyPair {
    pub key_pair: KeyPair,
    pub signature: Vec<u8>,
    pub key_id: u32,
}

impl SignedKeyPair {
    /// Generate a pre-key and sign its prefixed public key with `identity`.
    pub fn generate(identity: &KeyPair, key_id: u32) -> Self {
        let key_pair = KeyPair::generate();

        let mut signing_secret = [0u8; 32];
        let len = identity.private.len().min(32);
        signing_secret[..len].copy_from_slice(&identity.private[..len]);
        let signing_key = SigningKey::from_bytes(&signing_secret);
        signing_secret.zeroize();

        let mut message = Vec::with_capacity(33);
        message.push(DJB_KEY_TYPE);
        message.extend_from_slice(&key_pair.public);
        let signature = signing_key.sign(&message).to_bytes().to_vec();

        Self {
            key_pair,
            signature,
            key_id,
        }
    }

    fn to_value(&self) -> Value {
        Value::object([
            ("keyPair", self.key_pair.to_value()),
            ("signature", Value::from(self.signature.clone())),
            ("keyId", Value::from(self.key_id)),
        ])
    }

    fn from_value(value: &Value, field: &str) -> Result<Self, CodecError> {
        let fields = object(value, field)?;
        let key_pair = fields
            .get("keyPair")
            .ok_or_else(|| CodecError::MissingField(format!("{}.keyPair", field)))?;
        Ok(Self {
            key_pair: KeyPair::from_value(key_pair, &format!("{}.keyPair", field))?,
            signature: required_bytes(fields, "signature", field)?,
            key_id: optional_u32(fields, "keyId", field)?.unwrap_or(1),
        })
    }
}

/// User-facing account preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSettings {
    pub unarchive_chats: bool,
    pub auto_update_status: bool,
    pub status_msg_template: String,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            unarchive_chats: false,
            auto_update_status: true,
            status_msg_template: DEFAULT_STATUS_TEMPLATE.to_string(),
        }
    }
}

impl AccountSettings {
    fn to_value(&self) -> Value {
        Value::object([
            ("unarchiveChats", Value::from(self.unarchive_chats)),
            ("autoUpdateStatus", Value::from(self.auto_update_status)),
            ("statusMsgTemplate", Value::from(self.status_msg_template.as_str())),
        ])
    }

    fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        Self {
            unarchive_chats: value
                .get("unarchiveChats")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.unarchive_chats),
            auto_update_status: value
                .get("autoUpdateStatus")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.auto_update_status),
            status_msg_template: value
                .get("statusMsgTemplate")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(defaults.status_msg_template),
        }
    }
}

/// The credential bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationCreds {
    pub noise_key: KeyPair,
    pub signed_identity_key: KeyPair,
    pub signed_pre_key: SignedKeyPair,
    pub registration_id: u16,
    pub adv_secret_key: String,
    pub processed_history_messages: Vec<Value>,
    pub next_pre_key_id: u32,
    pub first_unuploaded_pre_key_id: u32,
    pub account_settings: AccountSettings,
    /// Signed device identity; opaque, since the client replaces it after pairing.
    pub account: Option<Value>,
    pub device_id: String,
    pub phone_id: String,
    pub identity_id: String,
    pub registered: bool,
    pub backup_token: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Fields added by the protocol client.
    pub extra: BTreeMap<String, Value>,
}

impl AuthenticationCreds {
    /// Synthesize a fresh, unregistered identity.
    pub fn generate() -> Self {
        let signed_identity_key = KeyPair::generate();
        let signed_pre_key = SignedKeyPair::generate(&signed_identity_key, 1);

        Self {
            noise_key: KeyPair::generate(),
            signed_identity_key,
            signed_pre_key,
            registration_id: generate_registration_id(),
            adv_secret_key: STANDARD.encode(random_bytes::<32>()),
            processed_history_messages: Vec::new(),
            next_pre_key_id: 1,
            first_unuploaded_pre_key_id: 1,
            account_settings: AccountSettings::default(),
            account: Some(Value::object([
                ("details", Value::from(DEFAULT_ACCOUNT_DETAILS)),
                ("accountSignature", Value::from(STANDARD.encode(random_bytes::<32>()))),
                ("platform", Value::from(DEFAULT_PLATFORM)),
            ])),
            device_id: hex::encode(random_bytes::<16>()),
            phone_id: hex::encode(random_bytes::<16>()),
            identity_id: STANDARD.encode(random_bytes::<20>()),
            registered: false,
            backup_token: STANDARD.encode(random_bytes::<20>()),
            created_at: now_millis(),
            extra: BTreeMap::new(),
        }
    }

    /// Record form, as handed to the write queue.
    pub fn to_value(&self) -> Value {
        let mut fields = self.extra.clone();
        let known = [
            ("noiseKey", self.noise_key.to_value()),
            ("signedIdentityKey", self.signed_identity_key.to_value()),
            ("signedPreKey", self.signed_pre_key.to_value()),
            ("registrationId", Value::from(self.registration_id)),
            ("advSecretKey", Value::from(self.adv_secret_key.as_str())),
            (
                "processedHistoryMessages",
                Value::Array(self.processed_history_messages.clone()),
            ),
            ("nextPreKeyId", Value::from(self.next_pre_key_id)),
            ("firstUnuploadedPreKeyId", Value::from(self.first_unuploaded_pre_key_id)),
            ("accountSettings", self.account_settings.to_value()),
            ("account", self.account.clone().unwrap_or(Value::Null)),
            ("deviceId", Value::from(self.device_id.as_str())),
            ("phoneId", Value::from(self.phone_id.as_str())),
            ("identityId", Value::from(self.identity_id.as_str())),
            ("registered", Value::from(self.registered)),
            ("backupToken", Value::from(self.backup_token.as_str())),
            ("createdAt", Value::from(self.created_at)),
        ];
        for (name, value) in known {
            fields.insert(name.to_string(), value);
        }
        Value::Object(fields)
    }

    /// Rebuild the bundle from its record form.
    ///
    /// Key material and the registration id are required; bookkeeping fields
    /// fall back to fresh-identity defaults when absent.
    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = object(value, "creds")?;
        let key = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| CodecError::MissingField(name.to_string()))
        };

        let registration_id = key("registrationId")?
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or(CodecError::UnexpectedShape {
                field: "registrationId".to_string(),
                expected: "16-bit integer",
            })?;

        let extra = fields
            .iter()
            .filter(|(name, _)| !KNOWN_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self {
            noise_key: KeyPair::from_value(key("noiseKey")?, "noiseKey")?,
            signed_identity_key: KeyPair::from_value(
                key("signedIdentityKey")?,
                "signedIdentityKey",
            )?,
            signed_pre_key: SignedKeyPair::from_value(key("signedPreKey")?, "signedPreKey")?,
            registration_id,
            adv_secret_key: optional_string(fields, "advSecretKey"),
            processed_history_messages: fields
                .get("processedHistoryMessages")
                .and_then(Value::as_array)
                .map(<[Value]>::to_vec)
                .unwrap_or_default(),
            next_pre_key_id: optional_u32(fields, "nextPreKeyId", "creds")?.unwrap_or(1),
            first_unuploaded_pre_key_id: optional_u32(fields, "firstUnuploadedPreKeyId", "creds")?
                .unwrap_or(1),
            account_settings: fields
                .get("accountSettings")
                .map(AccountSettings::from_value)
                .unwrap_or_default(),
            account: fields.get("account").filter(|v| !v.is_null()).cloned(),
            device_id: optional_string(fields, "deviceId"),
            phone_id: optional_string(fields, "phoneId"),
            identity_id: optional_string(fields, "identityId"),
            registered: fields
                .get("registered")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            backup_token: optional_string(fields, "backupToken"),
            created_at: fields
                .get("createdAt")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            extra,
        })
    }
}

/// Random 14-bit registration id.
pub fn generate_registration_id() -> u16 {
    u16::from_le_bytes(random_bytes::<2>()) & REGISTRATION_ID_MASK
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn object<'a>(value: &'a Value, field: &str) -> Result<&'a BTreeMap<String, Value>, CodecError> {
    value.as_object().ok_or(CodecError::UnexpectedShape {
        field: field.to_string(),
        expected: "object",
    })
}

fn required_bytes(
    fields: &BTreeMap<String, Value>,
    name: &str,
    parent: &str,
) -> Result<Vec<u8>, CodecError> {
    let path = format!("{}.{}", parent, name);
    fields
        .get(name)
        .ok_or_else(|| CodecError::MissingField(path.clone()))?
        .as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or(CodecError::UnexpectedShape {
            field: path,
            expected: "byte buffer",
        })
}

fn optional_u32(
    fields: &BTreeMap<String, Value>,
    name: &str,
    parent: &str,
) -> Result<Option<u32>, CodecError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or(CodecError::UnexpectedShape {
                field: format!("{}.{}", parent, name),
                expected: "32-bit unsigned integer",
            }),
    }
}

fn optional_string(fields: &BTreeMap<String, Value>, name: &str) -> String {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    #[test]
    fn test_generate_fresh_identity() {
        let creds = AuthenticationCreds::generate();

        assert!(!creds.registered);
        assert!(creds.registration_id <= REGISTRATION_ID_MASK);
        assert_eq!(creds.noise_key.public.len(), 32);
        assert_eq!(creds.signed_identity_key.private.len(), 32);
        assert_eq!(creds.signed_pre_key.key_id, 1);
        assert_eq!(creds.signed_pre_key.signature.len(), 64);
        assert_eq!(creds.next_pre_key_id, 1);
        assert_eq!(creds.first_unuploaded_pre_key_id, 1);
        assert_eq!(creds.device_id.len(), 32);
        assert_eq!(creds.phone_id.len(), 32);
        assert_eq!(STANDARD.decode(&creds.adv_secret_key).unwrap().len(), 32);
        assert_eq!(STANDARD.decode(&creds.identity_id).unwrap().len(), 20);
        assert!(creds.created_at > 0);
        assert!(creds.account_settings.auto_update_status);
    }

    #[test]
    fn test_identities_are_distinct() {
        let a = AuthenticationCreds::generate();
        let b = AuthenticationCreds::generate();
        assert_ne!(a.noise_key.public, b.noise_key.public);
        assert_ne!(a.device_id, b.device_id);
    }

    #[test]
    fn test_signed_pre_key_signature_verifies() {
        let identity = KeyPair::generate();
        let signed = SignedKeyPair::generate(&identity, 7);

        let mut secret = [0u8; 32];
        secret.copy_from_slice(&identity.private);
        let verifying_key = SigningKey::from_bytes(&secret).verifying_key();

        let mut message = vec![DJB_KEY_TYPE];
        message.extend_from_slice(&signed.key_pair.public);
        let signature = Signature::from_slice(&signed.signature).unwrap();
        assert!(verifying_key.verify(&message, &signature).is_ok());
        assert_eq!(signed.key_id, 7);
    }

    #[test]
    fn test_value_roundtrip_keeps_extra_fields() {
        let mut creds = AuthenticationCreds::generate();
        creds.registered = true;
        creds.next_pre_key_id = 31;
        creds.extra.insert(
            "me".to_string(),
            Value::object([("id", Value::from("123@s.whatsapp.net"))]),
        );

        let restored = AuthenticationCreds::from_value(&creds.to_value()).unwrap();
        assert_eq!(restored, creds);
    }

    #[test]
    fn test_from_value_requires_key_material() {
        let mut value = AuthenticationCreds::generate().to_value();
        if let Value::Object(fields) = &mut value {
            fields.remove("noiseKey");
        }
        assert!(matches!(
            AuthenticationCreds::from_value(&value),
            Err(CodecError::MissingField(field)) if field == "noiseKey"
        ));
    }

    #[test]
    fn test_from_value_defaults_bookkeeping() {
        let creds = AuthenticationCreds::generate();
        let value = Value::object([
            ("noiseKey", creds.noise_key.to_value()),
            ("signedIdentityKey", creds.signed_identity_key.to_value()),
            ("signedPreKey", creds.signed_pre_key.to_value()),
            ("registrationId", Value::from(42u16)),
        ]);

        let restored = AuthenticationCreds::from_value(&value).unwrap();
        assert_eq!(restored.registration_id, 42);
        assert_eq!(restored.next_pre_key_id, 1);
        assert!(!restored.registered);
        assert!(restored.account.is_none());
        assert!(restored.extra.is_empty());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = KeyPair::generate();
        let printed = format!("{:?}", pair);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&hex::encode(&pair.private)));
    }
}
