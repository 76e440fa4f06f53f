//! Channel options ("channel arguments").
//!
//! A caller configures a client channel or a server with an ordered sequence of
//! `(key, value)` pairs. This module models those pairs, checks the shape of
//! dynamically supplied option sets (JSON from a config file, for example) and
//! validates the values of the keys listed in [`keys`].
//!
//! ```rust
//! use chanargs_core::{keys, OptionSet};
//!
//! let options = OptionSet::new()
//!     .with(keys::SO_REUSEPORT, 1)
//!     .with(keys::MAX_RECEIVE_MESSAGE_LENGTH, 1024)
//!     .with("custom.flag", "on");
//!
//! let validated = options.validate().unwrap();
//! assert!(validated.reuse_port());
//! assert_eq!(validated.receive_limits().max_message_size(), Some(1024));
//! assert_eq!(validated.passthrough().len(), 1);
//! ```
//!
//! Unrecognized keys are not interpreted; they are kept, in order, in
//! [`ValidatedOptions::passthrough`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::error::{Code, Status};
use crate::limits::MessageLimits;

/// Keys recognized by the validator.
pub mod keys {
    /// Enable `SO_REUSEPORT` (and `SO_REUSEADDR`) on server listening sockets.
    pub const SO_REUSEPORT: &str = "grpc.so_reuseport";
    /// Maximum inbound message length in bytes, `-1` for unlimited.
    pub const MAX_RECEIVE_MESSAGE_LENGTH: &str = "grpc.max_receive_message_length";
    /// Maximum outbound message length in bytes, `-1` for unlimited.
    pub const MAX_SEND_MESSAGE_LENGTH: &str = "grpc.max_send_message_length";
    /// Prefix of the client `user-agent` header.
    pub const PRIMARY_USER_AGENT: &str = "grpc.primary_user_agent";
    /// TCP keep-alive interval of client connections, in milliseconds.
    pub const KEEPALIVE_TIME_MS: &str = "grpc.keepalive_time_ms";
}

/// The identifier of a channel option.
///
/// Keys are byte strings; text keys are stored as their UTF-8 bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OptionKey(Bytes);

impl OptionKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The key as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl fmt::Debug for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "{s:?}"),
            None => write!(f, "b{:?}", String::from_utf8_lossy(&self.0)),
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for OptionKey {
    fn from(key: &str) -> Self {
        Self(Bytes::copy_from_slice(key.as_bytes()))
    }
}

impl From<String> for OptionKey {
    fn from(key: String) -> Self {
        Self(Bytes::from(key.into_bytes()))
    }
}

impl From<&[u8]> for OptionKey {
    fn from(key: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(key))
    }
}

impl<const N: usize> From<&[u8; N]> for OptionKey {
    fn from(key: &[u8; N]) -> Self {
        Self(Bytes::copy_from_slice(key))
    }
}

impl From<Vec<u8>> for OptionKey {
    fn from(key: Vec<u8>) -> Self {
        Self(Bytes::from(key))
    }
}

/// A handle that can be converted to an integer option value.
///
/// Native transports accept opaque handles (pointers, descriptors) as integer
/// channel arguments. Implement this for such handles; the conversion runs once,
/// when the option set is validated.
pub trait IntegerLike: Send + Sync + fmt::Debug {
    fn to_integer(&self) -> Result<i64, String>;
}

/// The value of a channel option.
#[derive(Clone, Debug)]
pub enum OptionValue {
    /// Integers and booleans (`true` is 1, `false` is 0).
    Integer(i64),
    Bytes(Bytes),
    Text(String),
    /// A value converted to an integer at validation time.
    IntegerLike(Arc<dyn IntegerLike>),
}

impl OptionValue {
    pub fn integer_like<T: IntegerLike + 'static>(value: T) -> Self {
        OptionValue::IntegerLike(Arc::new(value))
    }

    /// Resolve to a plain value, running integer conversions and range checks.
    fn resolve(&self, key: &OptionKey) -> Result<ResolvedValue, OptionError> {
        let integer = match self {
            OptionValue::Integer(v) => *v,
            OptionValue::IntegerLike(handle) => {
                handle
                    .to_integer()
                    .map_err(|reason| OptionError::InvalidValue {
                        key: key.to_string(),
                        reason: format!("integer conversion failed: {reason}"),
                    })?
            }
            OptionValue::Bytes(b) => return Ok(ResolvedValue::Bytes(b.clone())),
            OptionValue::Text(s) => return Ok(ResolvedValue::Text(s.clone())),
        };

        // Channel argument integers are C ints on the native side.
        if i32::try_from(integer).is_err() {
            return Err(OptionError::InvalidValue {
                key: key.to_string(),
                reason: format!("integer {integer} does not fit in 32 bits"),
            });
        }
        Ok(ResolvedValue::Integer(integer))
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Integer(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Integer(v.into())
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Integer(v.into())
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Integer(v.into())
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

impl From<&[u8]> for OptionValue {
    fn from(v: &[u8]) -> Self {
        OptionValue::Bytes(Bytes::copy_from_slice(v))
    }
}

impl<const N: usize> From<&[u8; N]> for OptionValue {
    fn from(v: &[u8; N]) -> Self {
        OptionValue::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(v: Vec<u8>) -> Self {
        OptionValue::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for OptionValue {
    fn from(v: Bytes) -> Self {
        OptionValue::Bytes(v)
    }
}

/// A value after validation: integer conversions have run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedValue {
    Integer(i64),
    Bytes(Bytes),
    Text(String),
}

impl ResolvedValue {
    fn type_name(&self) -> &'static str {
        match self {
            ResolvedValue::Integer(_) => "integer",
            ResolvedValue::Bytes(_) => "bytes",
            ResolvedValue::Text(_) => "text",
        }
    }
}

/// A single `(key, value)` pair.
#[derive(Clone, Debug)]
pub struct ChannelOption {
    pub key: OptionKey,
    pub value: OptionValue,
}

impl ChannelOption {
    pub fn new(key: impl Into<OptionKey>, value: impl Into<OptionValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered sequence of channel options.
#[derive(Clone, Debug, Default)]
pub struct OptionSet(Vec<ChannelOption>);

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an option.
    pub fn with(mut self, key: impl Into<OptionKey>, value: impl Into<OptionValue>) -> Self {
        self.0.push(ChannelOption::new(key, value));
        self
    }

    pub fn push(&mut self, option: ChannelOption) {
        self.0.push(option);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChannelOption> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build an option set from dynamically shaped JSON.
    ///
    /// The input must be an array of two-element arrays `[key, value]`. Keys are
    /// strings or arrays of bytes. Values are integers, booleans, strings or
    /// arrays of bytes.
    pub fn from_json(value: &Value) -> Result<Self, OptionError> {
        let Value::Array(pairs) = value else {
            return Err(OptionError::NotASequence {
                found: json_type_name(value),
            });
        };

        let mut options = OptionSet::new();
        for (index, pair) in pairs.iter().enumerate() {
            let (key, value) = match pair {
                Value::Array(items) if items.len() == 2 => (&items[0], &items[1]),
                Value::Array(items) => {
                    return Err(OptionError::MalformedPair {
                        index,
                        found: format!("array of length {}", items.len()),
                    });
                }
                other => {
                    return Err(OptionError::MalformedPair {
                        index,
                        found: json_type_name(other).to_owned(),
                    });
                }
            };
            let key = json_key(index, key)?;
            let value = json_value(&key, value)?;
            options.push(ChannelOption { key, value });
        }
        Ok(options)
    }

    /// Validate every option and extract the recognized settings.
    ///
    /// When a recognized key appears more than once the last value wins.
    pub fn validate(&self) -> Result<ValidatedOptions, OptionError> {
        let mut validated = ValidatedOptions::default();

        for option in &self.0 {
            let key = &option.key;
            let value = option.value.resolve(key)?;

            match key.as_str() {
                Some(keys::SO_REUSEPORT) => {
                    validated.reuse_port = expect_integer(key, &value)? != 0;
                }
                Some(keys::MAX_RECEIVE_MESSAGE_LENGTH) => {
                    validated.receive_limits = length_limit(key, &value)?;
                }
                Some(keys::MAX_SEND_MESSAGE_LENGTH) => {
                    validated.send_limits = length_limit(key, &value)?;
                }
                Some(keys::PRIMARY_USER_AGENT) => {
                    validated.primary_user_agent = Some(expect_text(key, &value)?);
                }
                Some(keys::KEEPALIVE_TIME_MS) => {
                    let millis = expect_integer(key, &value)?;
                    if millis <= 0 {
                        return Err(OptionError::InvalidValue {
                            key: key.to_string(),
                            reason: format!("keep-alive time must be positive, got {millis}"),
                        });
                    }
                    validated.keepalive = Some(Duration::from_millis(millis as u64));
                }
                _ => {
                    tracing::debug!(key = ?key, value = ?value, "forwarding unrecognized channel option");
                    validated.passthrough.push((key.clone(), value));
                }
            }
        }

        Ok(validated)
    }
}

impl<'a> IntoIterator for &'a OptionSet {
    type Item = &'a ChannelOption;
    type IntoIter = std::slice::Iter<'a, ChannelOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for OptionSet {
    type Item = ChannelOption;
    type IntoIter = std::vec::IntoIter<ChannelOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K, V> FromIterator<(K, V)> for OptionSet
where
    K: Into<OptionKey>,
    V: Into<OptionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| ChannelOption::new(k, v))
                .collect(),
        )
    }
}

fn expect_integer(key: &OptionKey, value: &ResolvedValue) -> Result<i64, OptionError> {
    match value {
        ResolvedValue::Integer(v) => Ok(*v),
        other => Err(OptionError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected integer, got {}", other.type_name()),
        }),
    }
}

fn expect_text(key: &OptionKey, value: &ResolvedValue) -> Result<String, OptionError> {
    match value {
        ResolvedValue::Text(s) => Ok(s.clone()),
        ResolvedValue::Bytes(b) => String::from_utf8(b.to_vec()).map_err(|_| {
            OptionError::InvalidValue {
                key: key.to_string(),
                reason: "bytes are not valid UTF-8".to_owned(),
            }
        }),
        other => Err(OptionError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected text, got {}", other.type_name()),
        }),
    }
}

fn length_limit(key: &OptionKey, value: &ResolvedValue) -> Result<MessageLimits, OptionError> {
    match expect_integer(key, value)? {
        -1 => Ok(MessageLimits::unlimited()),
        n if n >= 0 => Ok(MessageLimits::new(n as usize)),
        n => Err(OptionError::InvalidValue {
            key: key.to_string(),
            reason: format!("length must be -1 or non-negative, got {n}"),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

fn json_bytes(items: &[Value]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

fn json_key(index: usize, key: &Value) -> Result<OptionKey, OptionError> {
    match key {
        Value::String(s) => Ok(OptionKey::from(s.as_str())),
        Value::Array(items) => json_bytes(items)
            .map(OptionKey::from)
            .ok_or(OptionError::InvalidKey {
                index,
                found: "array of non-bytes",
            }),
        other => Err(OptionError::InvalidKey {
            index,
            found: json_type_name(other),
        }),
    }
}

fn json_value(key: &OptionKey, value: &Value) -> Result<OptionValue, OptionError> {
    let invalid = |reason: String| OptionError::InvalidValue {
        key: key.to_string(),
        reason,
    };
    match value {
        Value::Bool(b) => Ok(OptionValue::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(OptionValue::Integer)
            .ok_or_else(|| invalid(format!("{n} is not an integer"))),
        Value::String(s) => Ok(OptionValue::Text(s.clone())),
        Value::Array(items) => json_bytes(items)
            .map(OptionValue::from)
            .ok_or_else(|| invalid("arrays must hold bytes (0..=255)".to_owned())),
        other => Err(invalid(format!("unsupported {}", json_type_name(other)))),
    }
}

/// Settings extracted from a validated [`OptionSet`].
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedOptions {
    reuse_port: bool,
    receive_limits: MessageLimits,
    send_limits: MessageLimits,
    primary_user_agent: Option<String>,
    keepalive: Option<Duration>,
    passthrough: Vec<(OptionKey, ResolvedValue)>,
}

impl Default for ValidatedOptions {
    fn default() -> Self {
        Self {
            reuse_port: false,
            receive_limits: MessageLimits::receive_default(),
            send_limits: MessageLimits::unlimited(),
            primary_user_agent: None,
            keepalive: None,
            passthrough: Vec::new(),
        }
    }
}

impl ValidatedOptions {
    /// Whether listening sockets get `SO_REUSEPORT` and `SO_REUSEADDR`.
    pub fn reuse_port(&self) -> bool {
        self.reuse_port
    }

    pub fn receive_limits(&self) -> MessageLimits {
        self.receive_limits
    }

    pub fn send_limits(&self) -> MessageLimits {
        self.send_limits
    }

    pub fn primary_user_agent(&self) -> Option<&str> {
        self.primary_user_agent.as_deref()
    }

    pub fn keepalive(&self) -> Option<Duration> {
        self.keepalive
    }

    /// Unrecognized options, in the order they were supplied.
    pub fn passthrough(&self) -> &[(OptionKey, ResolvedValue)] {
        &self.passthrough
    }

    /// Look up a forwarded option by key. The last occurrence wins.
    pub fn get(&self, key: impl Into<OptionKey>) -> Option<&ResolvedValue> {
        let key = key.into();
        self.passthrough
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// Broad category of an option error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionErrorKind {
    /// The input has the wrong type altogether (not a sequence, key not text/bytes).
    Type,
    /// The input has the right type but an unacceptable value.
    Value,
}

/// Errors raised while building or validating an option set.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    #[error("options must be a sequence of (key, value) pairs, got {found}")]
    NotASequence { found: &'static str },

    #[error("option at index {index} must be a (key, value) pair, got {found}")]
    MalformedPair { index: usize, found: String },

    #[error("option key at index {index} must be text or bytes, got {found}")]
    InvalidKey { index: usize, found: &'static str },

    #[error("invalid value for option {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("options are not valid JSON: {0}")]
    Syntax(String),
}

impl OptionError {
    pub fn kind(&self) -> OptionErrorKind {
        match self {
            OptionError::NotASequence { .. }
            | OptionError::InvalidKey { .. }
            | OptionError::Syntax(_) => OptionErrorKind::Type,
            OptionError::MalformedPair { .. } | OptionError::InvalidValue { .. } => {
                OptionErrorKind::Value
            }
        }
    }

    /// Option errors are always argument errors.
    pub fn code(&self) -> Code {
        Code::InvalidArgument
    }
}

impl From<OptionError> for Status {
    fn from(err: OptionError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

/// Conversion into an [`OptionSet`], accepted by channel and server constructors.
///
/// Statically typed inputs always succeed. Dynamic inputs (JSON values and JSON
/// text, as loaded from configuration) are shape-checked here, before any
/// network resource is allocated.
pub trait IntoOptionSet {
    fn into_option_set(self) -> Result<OptionSet, OptionError>;
}

impl IntoOptionSet for OptionSet {
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        Ok(self)
    }
}

impl IntoOptionSet for () {
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        Ok(OptionSet::new())
    }
}

impl IntoOptionSet for Vec<ChannelOption> {
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        Ok(OptionSet(self))
    }
}

impl<K, V> IntoOptionSet for Vec<(K, V)>
where
    K: Into<OptionKey>,
    V: Into<OptionValue>,
{
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        Ok(self.into_iter().collect())
    }
}

impl<K, V, const N: usize> IntoOptionSet for [(K, V); N]
where
    K: Into<OptionKey>,
    V: Into<OptionValue>,
{
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        Ok(self.into_iter().collect())
    }
}

impl IntoOptionSet for &Value {
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        OptionSet::from_json(self)
    }
}

impl IntoOptionSet for Value {
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        OptionSet::from_json(&self)
    }
}

/// JSON text, e.g. the contents of a configuration file.
impl IntoOptionSet for &str {
    fn into_option_set(self) -> Result<OptionSet, OptionError> {
        let value: Value =
            serde_json::from_str(self).map_err(|e| OptionError::Syntax(e.to_string()))?;
        OptionSet::from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct PointerWrapper;

    impl IntegerLike for PointerWrapper {
        fn to_integer(&self) -> Result<i64, String> {
            Ok(123456)
        }
    }

    #[derive(Debug)]
    struct BrokenHandle;

    impl IntegerLike for BrokenHandle {
        fn to_integer(&self) -> Result<i64, String> {
            Err("handle already released".to_owned())
        }
    }

    #[test]
    fn test_heterogeneous_values_forwarded() {
        let options = OptionSet::new()
            .with("arg1", b"bytes_val")
            .with("arg2", "str_val")
            .with("arg3", 1)
            .with(b"arg4", "str_val")
            .with("arg6", OptionValue::integer_like(PointerWrapper));

        let validated = options.validate().unwrap();
        let forwarded = validated.passthrough();

        assert_eq!(forwarded.len(), 5);
        assert_eq!(forwarded[0].0.as_str(), Some("arg1"));
        assert_eq!(
            forwarded[0].1,
            ResolvedValue::Bytes(Bytes::from_static(b"bytes_val"))
        );
        assert_eq!(forwarded[2].1, ResolvedValue::Integer(1));
        assert_eq!(forwarded[3].0.as_bytes(), b"arg4");
        assert_eq!(validated.get("arg6"), Some(&ResolvedValue::Integer(123456)));
    }

    #[test]
    fn test_integer_like_failure() {
        let err = OptionSet::new()
            .with("handle", OptionValue::integer_like(BrokenHandle))
            .validate()
            .unwrap_err();

        assert_eq!(err.kind(), OptionErrorKind::Value);
        assert!(err.to_string().contains("handle already released"));
    }

    #[test]
    fn test_integer_range() {
        let err = OptionSet::new()
            .with("big", i64::from(i32::MAX) + 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { .. }));

        assert!(OptionSet::new().with("max", i32::MAX).validate().is_ok());
        assert!(OptionSet::new().with("min", i32::MIN).validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let validated = OptionSet::new().validate().unwrap();
        assert!(!validated.reuse_port());
        assert_eq!(validated.receive_limits(), MessageLimits::receive_default());
        assert_eq!(validated.send_limits(), MessageLimits::unlimited());
        assert!(validated.primary_user_agent().is_none());
        assert!(validated.keepalive().is_none());
        assert!(validated.passthrough().is_empty());
    }

    #[test]
    fn test_reuse_port() {
        let on = OptionSet::new().with(keys::SO_REUSEPORT, 1).validate().unwrap();
        assert!(on.reuse_port());

        let off = OptionSet::new().with(keys::SO_REUSEPORT, 0).validate().unwrap();
        assert!(!off.reuse_port());

        let flag = OptionSet::new().with(keys::SO_REUSEPORT, true).validate().unwrap();
        assert!(flag.reuse_port());
    }

    #[test]
    fn test_reuse_port_rejects_text() {
        let err = OptionSet::new()
            .with(keys::SO_REUSEPORT, "yes")
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            OptionError::InvalidValue {
                key: keys::SO_REUSEPORT.to_owned(),
                reason: "expected integer, got text".to_owned(),
            }
        );
    }

    #[test]
    fn test_message_lengths() {
        let validated = OptionSet::new()
            .with(keys::MAX_RECEIVE_MESSAGE_LENGTH, 1024)
            .with(keys::MAX_SEND_MESSAGE_LENGTH, 2048)
            .validate()
            .unwrap();
        assert_eq!(validated.receive_limits(), MessageLimits::new(1024));
        assert_eq!(validated.send_limits(), MessageLimits::new(2048));

        let unlimited = OptionSet::new()
            .with(keys::MAX_RECEIVE_MESSAGE_LENGTH, -1)
            .validate()
            .unwrap();
        assert_eq!(unlimited.receive_limits(), MessageLimits::unlimited());

        let err = OptionSet::new()
            .with(keys::MAX_RECEIVE_MESSAGE_LENGTH, -2)
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn test_last_value_wins() {
        let validated = OptionSet::new()
            .with(keys::MAX_RECEIVE_MESSAGE_LENGTH, 10)
            .with(keys::MAX_RECEIVE_MESSAGE_LENGTH, 20)
            .validate()
            .unwrap();
        assert_eq!(validated.receive_limits(), MessageLimits::new(20));
    }

    #[test]
    fn test_user_agent_and_keepalive() {
        let validated = OptionSet::new()
            .with(keys::PRIMARY_USER_AGENT, b"probe/1.0")
            .with(keys::KEEPALIVE_TIME_MS, 30_000)
            .validate()
            .unwrap();
        assert_eq!(validated.primary_user_agent(), Some("probe/1.0"));
        assert_eq!(validated.keepalive(), Some(Duration::from_secs(30)));

        let err = OptionSet::new()
            .with(keys::KEEPALIVE_TIME_MS, 0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), OptionErrorKind::Value);
    }

    #[test]
    fn test_from_json_well_formed() {
        let options = OptionSet::from_json(&json!([
            ["arg1", [98, 121, 116, 101, 115]],
            ["arg2", "str_val"],
            ["arg3", 1],
            [[97, 114, 103, 52], "str_val"],
            [keys::SO_REUSEPORT, true],
        ]))
        .unwrap();
        assert_eq!(options.len(), 5);

        let validated = options.validate().unwrap();
        assert!(validated.reuse_port());
        assert_eq!(
            validated.get("arg1"),
            Some(&ResolvedValue::Bytes(Bytes::from_static(b"bytes")))
        );
        assert_eq!(
            validated.get(b"arg4"),
            Some(&ResolvedValue::Text("str_val".to_owned()))
        );
    }

    #[test]
    fn test_from_json_rejects_malformed_shapes() {
        let mapping = OptionSet::from_json(&json!({"foo": "bar"})).unwrap_err();
        assert_eq!(mapping, OptionError::NotASequence { found: "mapping" });
        assert_eq!(mapping.kind(), OptionErrorKind::Type);

        let one_tuples = OptionSet::from_json(&json!([["key"]])).unwrap_err();
        assert_eq!(
            one_tuples,
            OptionError::MalformedPair {
                index: 0,
                found: "array of length 1".to_owned()
            }
        );
        assert_eq!(one_tuples.kind(), OptionErrorKind::Value);

        let text = OptionSet::from_json(&json!("str")).unwrap_err();
        assert_eq!(text, OptionError::NotASequence { found: "string" });
    }

    #[test]
    fn test_from_json_rejects_bad_members() {
        let err = OptionSet::from_json(&json!([[1, 2]])).unwrap_err();
        assert_eq!(err, OptionError::InvalidKey { index: 0, found: "number" });

        let err = OptionSet::from_json(&json!([["k", 1.5]])).unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { .. }));

        let err = OptionSet::from_json(&json!([["k", null]])).unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { .. }));

        let err = OptionSet::from_json(&json!([["k", [1, 300]]])).unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue { .. }));
    }

    #[test]
    fn test_into_option_set_text() {
        let options = r#"[["grpc.max_receive_message_length", 1024]]"#
            .into_option_set()
            .unwrap();
        assert_eq!(options.len(), 1);

        let err = "str".into_option_set().unwrap_err();
        assert!(matches!(err, OptionError::Syntax(_)));
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn test_into_option_set_static() {
        let options = [("a", 1), ("b", 2)].into_option_set().unwrap();
        assert_eq!(options.len(), 2);
        assert!(().into_option_set().unwrap().is_empty());
    }

    #[test]
    fn test_option_error_into_status() {
        let status: Status = OptionError::NotASequence { found: "mapping" }.into();
        assert_eq!(status.code(), Code::InvalidArgument);
    }
}
