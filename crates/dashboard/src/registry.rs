//! Typed entries of the state manager registry.
//!
//! Entries are keyed by a 32 byte id. Users refer to them either by the raw
//! id or by a readable label (e.g. `fee.collector`) whose keccak256 hash is
//! the id. Each entry stores one typed value, the permission required to
//! change it and whether it may be changed at all.

use {
    crate::{
        admins::ADMIN_ROLE,
        error::{Result, ValidationError},
        traits::{RegistryReading, RegistryWriting},
    },
    alloy::primitives::{Address, B256, U256, keccak256},
    anyhow::{Context, anyhow},
    std::{fmt, str::FromStr, sync::Arc},
};

/// Label prefix of governance module entries.
const MODULE_PREFIX: &str = "module.";

/// Type tag stored next to every registry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ValueType {
    Address,
    #[value(name = "uint256")]
    UInt256,
    Bool,
    Bytes32,
}

impl ValueType {
    /// Decodes the `valueType` returned by `getEntryInfo`.
    pub fn from_onchain(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ValueType::Address),
            1 => Some(ValueType::UInt256),
            2 => Some(ValueType::Bool),
            3 => Some(ValueType::Bytes32),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Address => "address",
            ValueType::UInt256 => "uint256",
            ValueType::Bool => "bool",
            ValueType::Bytes32 => "bytes32",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryValue {
    Address(Address),
    UInt256(U256),
    Bool(bool),
    Bytes32(B256),
}

impl EntryValue {
    /// Parses user input as a value of the given type.
    pub fn parse(value_type: ValueType, input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        let invalid = || ValidationError::Value {
            expected: value_type.to_string(),
            input: input.to_string(),
        };
        if input.is_empty() {
            return Err(invalid());
        }
        Ok(match value_type {
            ValueType::Address => EntryValue::Address(parse_address(input)?),
            ValueType::UInt256 => {
                EntryValue::UInt256(U256::from_str_radix(input, 10).map_err(|_| invalid())?)
            }
            ValueType::Bool => EntryValue::Bool(match input {
                "true" => true,
                "false" => false,
                _ => return Err(invalid()),
            }),
            ValueType::Bytes32 => EntryValue::Bytes32(parse_bytes32(input).ok_or_else(invalid)?),
        })
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            EntryValue::Address(_) => ValueType::Address,
            EntryValue::UInt256(_) => ValueType::UInt256,
            EntryValue::Bool(_) => ValueType::Bool,
            EntryValue::Bytes32(_) => ValueType::Bytes32,
        }
    }
}

impl fmt::Display for EntryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryValue::Address(value) => write!(f, "{value}"),
            EntryValue::UInt256(value) => write!(f, "{value}"),
            EntryValue::Bool(value) => write!(f, "{value}"),
            EntryValue::Bytes32(value) => write!(f, "{value}"),
        }
    }
}

/// Parses a `0x` prefixed address.
pub fn parse_address(input: &str) -> Result<Address, ValidationError> {
    let input = input.trim();
    if !input.starts_with("0x") {
        return Err(ValidationError::Address(input.to_string()));
    }
    Address::from_str(input).map_err(|_| ValidationError::Address(input.to_string()))
}

/// Only `0x` followed by exactly 64 hex digits counts as a raw hash.
fn parse_bytes32(input: &str) -> Option<B256> {
    let digits = input.strip_prefix("0x")?;
    if digits.len() != 64 {
        return None;
    }
    B256::from_str(input).ok()
}

/// Raw 32 byte hashes are used verbatim, anything else is hashed.
fn hash_or_verbatim(input: &str) -> B256 {
    parse_bytes32(input).unwrap_or_else(|| keccak256(input))
}

/// Parses a permission given either as a raw role hash or as a role name
/// such as `ADMIN_ROLE`.
pub fn parse_permission(input: &str) -> Result<B256, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ValidationError::Value {
            expected: "permission".to_string(),
            input: input.to_string(),
        });
    }
    Ok(hash_or_verbatim(input))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryId {
    key: B256,
    label: String,
}

impl EntryId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::Value {
                expected: "entry id".to_string(),
                input: input.to_string(),
            });
        }
        Ok(Self {
            key: hash_or_verbatim(input),
            label: input.to_string(),
        })
    }

    /// The entry holding the address of the governance module `name`.
    pub fn module(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Value {
                expected: "module name".to_string(),
                input: name.to_string(),
            });
        }
        Self::parse(&format!("{MODULE_PREFIX}{name}"))
    }

    pub fn key(&self) -> B256 {
        self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_module(&self) -> bool {
        self.label.starts_with(MODULE_PREFIX)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Metadata returned by `getEntryInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// Raw type tag, see [`ValueType::from_onchain`].
    pub value_type: u8,
    pub permission: B256,
    pub immutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: EntryId,
    pub value: EntryValue,
    pub permission: B256,
    pub immutable: bool,
}

/// Result of a successful registry write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    pub transaction: B256,
    /// All entries as read back after the write.
    pub entries: Vec<RegistryEntry>,
}

pub struct Registry {
    address: Address,
    reader: Arc<dyn RegistryReading>,
    writer: Arc<dyn RegistryWriting>,
}

impl Registry {
    pub fn new(
        address: Address,
        reader: Arc<dyn RegistryReading>,
        writer: Arc<dyn RegistryWriting>,
    ) -> Self {
        Self {
            address,
            reader,
            writer,
        }
    }

    /// Reads a single entry, `None` if the registry does not know the id.
    pub async fn load_entry(&self, id: &EntryId) -> Result<Option<RegistryEntry>> {
        let key = id.key();
        let exists = self
            .reader
            .exists(self.address, key)
            .await
            .with_context(|| format!("checking existence of {id}"))?;
        if !exists {
            tracing::debug!(%id, "registry entry does not exist");
            return Ok(None);
        }

        let info = self
            .reader
            .entry_info(self.address, key)
            .await
            .with_context(|| format!("reading info of {id}"))?;
        let value_type = ValueType::from_onchain(info.value_type)
            .ok_or_else(|| anyhow!("entry {id} has unknown value type {}", info.value_type))?;
        let reader = &self.reader;
        let value = match value_type {
            ValueType::Address => reader
                .get_address(self.address, key)
                .await
                .map(EntryValue::Address),
            ValueType::UInt256 => reader
                .get_uint(self.address, key)
                .await
                .map(EntryValue::UInt256),
            ValueType::Bool => reader
                .get_bool(self.address, key)
                .await
                .map(EntryValue::Bool),
            ValueType::Bytes32 => reader
                .get_bytes32(self.address, key)
                .await
                .map(EntryValue::Bytes32),
        }
        .with_context(|| format!("reading value of {id}"))?;

        Ok(Some(RegistryEntry {
            id: id.clone(),
            value,
            permission: info.permission,
            immutable: info.immutable,
        }))
    }

    /// Reads all given entries concurrently, skipping ids that do not exist.
    pub async fn load_entries(&self, ids: &[EntryId]) -> Result<Vec<RegistryEntry>> {
        let entries =
            futures::future::try_join_all(ids.iter().map(|id| self.load_entry(id))).await?;
        Ok(entries.into_iter().flatten().collect())
    }

    /// Sets `id` to `value` and reads back `known` (plus `id`) afterwards.
    ///
    /// Writes to immutable entries and writes that would change the stored
    /// value type are rejected before a transaction is sent. Without an
    /// explicit `permission` an existing entry keeps its permission and a new
    /// one requires the admin role.
    pub async fn write_entry(
        &self,
        id: &EntryId,
        value: EntryValue,
        permission: Option<B256>,
        known: &[EntryId],
    ) -> Result<Written> {
        let current = self.load_entry(id).await?;
        if let Some(current) = &current {
            if current.immutable {
                return Err(ValidationError::Immutable(id.to_string()).into());
            }
            if current.value.value_type() != value.value_type() {
                return Err(ValidationError::TypeMismatch {
                    id: id.to_string(),
                    stored: current.value.value_type().to_string(),
                    given: value.value_type().to_string(),
                }
                .into());
            }
        }
        let permission = permission
            .or(current.map(|entry| entry.permission))
            .unwrap_or(*ADMIN_ROLE);

        let key = id.key();
        tracing::info!(%id, %value, %permission, "writing registry entry");
        let transaction = match value {
            EntryValue::Address(value) => {
                self.writer.set_address(self.address, key, value, permission).await
            }
            EntryValue::UInt256(value) => {
                self.writer.set_uint(self.address, key, value, permission).await
            }
            EntryValue::Bool(value) => {
                self.writer.set_bool(self.address, key, value, permission).await
            }
            EntryValue::Bytes32(value) => {
                self.writer.set_bytes32(self.address, key, value, permission).await
            }
        }
        .with_context(|| format!("writing {id}"))?;

        let mut ids = known.to_vec();
        if !ids.contains(id) {
            ids.push(id.clone());
        }
        let entries = self.load_entries(&ids).await?;
        Ok(Written {
            transaction,
            entries,
        })
    }

    /// Points the governance module `name` at `module`.
    pub async fn assign_module(
        &self,
        name: &str,
        module: Address,
        known: &[EntryId],
    ) -> Result<Written> {
        let id = EntryId::module(name)?;
        self.write_entry(&id, EntryValue::Address(module), None, known)
            .await
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::Error,
            traits::{MockRegistryReading, MockRegistryWriting},
        },
        mockall::predicate::eq,
    };

    const REGISTRY: Address = Address::with_last_byte(0x42);

    fn id(label: &str) -> EntryId {
        EntryId::parse(label).unwrap()
    }

    /// Registry reader that knows a single uint entry.
    fn reader_with_uint(key: B256, value: u64, immutable: bool) -> MockRegistryReading {
        let mut reader = MockRegistryReading::new();
        reader
            .expect_exists()
            .returning(move |_, requested| Ok(requested == key));
        reader.expect_entry_info().returning(move |_, _| {
            Ok(EntryInfo {
                value_type: 1,
                permission: *ADMIN_ROLE,
                immutable,
            })
        });
        reader
            .expect_get_uint()
            .returning(move |_, _| Ok(U256::from(value)));
        reader
    }

    #[test]
    fn entry_ids_hash_labels_and_keep_raw_hashes() {
        let label = id("fee.collector");
        assert_eq!(label.key(), keccak256("fee.collector"));
        assert_eq!(label.to_string(), "fee.collector");

        let raw = "0x1111111111111111111111111111111111111111111111111111111111111111";
        assert_eq!(id(raw).key(), B256::repeat_byte(0x11));

        // Too short to be a hash, so it is a label.
        assert_eq!(id("0x1234").key(), keccak256("0x1234"));
        assert!(EntryId::parse("  ").is_err());
    }

    #[test]
    fn module_ids_are_prefixed() {
        let module = EntryId::module("voting").unwrap();
        assert_eq!(module.key(), keccak256("module.voting"));
        assert!(module.is_module());
        assert!(!id("voting").is_module());
        assert!(EntryId::module("").is_err());
    }

    #[test]
    fn parses_values_by_type() {
        assert_eq!(
            EntryValue::parse(ValueType::UInt256, "1000").unwrap(),
            EntryValue::UInt256(U256::from(1000))
        );
        assert_eq!(
            EntryValue::parse(ValueType::Bool, "true").unwrap(),
            EntryValue::Bool(true)
        );
        assert_eq!(
            EntryValue::parse(ValueType::Address, "0x0000000000000000000000000000000000000042")
                .unwrap(),
            EntryValue::Address(REGISTRY)
        );
        assert!(EntryValue::parse(ValueType::UInt256, "-1").is_err());
        assert!(EntryValue::parse(ValueType::Bool, "yes").is_err());
        assert!(EntryValue::parse(ValueType::Address, "0x42").is_err());
        assert!(EntryValue::parse(ValueType::Bytes32, "0x42").is_err());
        assert!(matches!(
            EntryValue::parse(ValueType::UInt256, "ten"),
            Err(ValidationError::Value { .. })
        ));
    }

    #[test]
    fn permissions_accept_names_and_hashes() {
        assert_eq!(parse_permission("ADMIN_ROLE").unwrap(), *ADMIN_ROLE);
        assert_eq!(parse_permission(&ADMIN_ROLE.to_string()).unwrap(), *ADMIN_ROLE);
        assert!(parse_permission("").is_err());
    }

    #[test]
    fn value_types_round_trip_through_onchain_tags() {
        assert_eq!(ValueType::from_onchain(0), Some(ValueType::Address));
        assert_eq!(ValueType::from_onchain(3), Some(ValueType::Bytes32));
        assert_eq!(ValueType::from_onchain(4), None);
    }

    #[tokio::test]
    async fn loads_existing_entries_and_skips_missing_ones() {
        let fee = id("fee.bps");
        let reader = reader_with_uint(fee.key(), 30, false);
        let registry = Registry::new(
            REGISTRY,
            Arc::new(reader),
            Arc::new(MockRegistryWriting::new()),
        );

        let entries = registry
            .load_entries(&[id("unknown"), fee.clone()])
            .await
            .unwrap();
        assert_eq!(
            entries,
            vec![RegistryEntry {
                id: fee,
                value: EntryValue::UInt256(U256::from(30)),
                permission: *ADMIN_ROLE,
                immutable: false,
            }]
        );
    }

    #[tokio::test]
    async fn unknown_value_type_is_an_error() {
        let mut reader = MockRegistryReading::new();
        reader.expect_exists().returning(|_, _| Ok(true));
        reader.expect_entry_info().returning(|_, _| {
            Ok(EntryInfo {
                value_type: 9,
                permission: B256::ZERO,
                immutable: false,
            })
        });
        let registry = Registry::new(
            REGISTRY,
            Arc::new(reader),
            Arc::new(MockRegistryWriting::new()),
        );
        assert!(matches!(
            registry.load_entry(&id("weird")).await,
            Err(Error::Provider(_))
        ));
    }

    #[tokio::test]
    async fn immutable_entries_are_never_written() {
        let fee = id("fee.bps");
        let reader = reader_with_uint(fee.key(), 30, true);
        let mut writer = MockRegistryWriting::new();
        writer.expect_set_uint().never();
        let registry = Registry::new(REGISTRY, Arc::new(reader), Arc::new(writer));

        let result = registry
            .write_entry(&fee, EntryValue::UInt256(U256::from(50)), None, &[])
            .await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::Immutable(label))) if label == "fee.bps"
        ));
    }

    #[tokio::test]
    async fn type_changes_are_rejected() {
        let fee = id("fee.bps");
        let reader = reader_with_uint(fee.key(), 30, false);
        let mut writer = MockRegistryWriting::new();
        writer.expect_set_bool().never();
        let registry = Registry::new(REGISTRY, Arc::new(reader), Arc::new(writer));

        let result = registry
            .write_entry(&fee, EntryValue::Bool(true), None, &[])
            .await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::TypeMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn writes_keep_existing_permission_and_read_back() {
        let fee = id("fee.bps");
        let reader = reader_with_uint(fee.key(), 30, false);
        let mut writer = MockRegistryWriting::new();
        writer
            .expect_set_uint()
            .with(
                eq(REGISTRY),
                eq(fee.key()),
                eq(U256::from(50)),
                eq(*ADMIN_ROLE),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(B256::repeat_byte(1)));
        let registry = Registry::new(REGISTRY, Arc::new(reader), Arc::new(writer));

        let written = registry
            .write_entry(&fee, EntryValue::UInt256(U256::from(50)), None, &[fee.clone()])
            .await
            .unwrap();
        assert_eq!(written.transaction, B256::repeat_byte(1));
        // The mock keeps returning the old value; one entry is read back.
        assert_eq!(written.entries.len(), 1);
    }

    #[tokio::test]
    async fn module_assignment_writes_new_address_entry() {
        let module = Address::with_last_byte(7);
        let key = keccak256("module.voting");
        let mut reader = MockRegistryReading::new();
        let mut stored = false;
        reader.expect_exists().returning(move |_, _| {
            // Missing before the write, present when read back.
            let exists = stored;
            stored = true;
            Ok(exists)
        });
        reader.expect_entry_info().returning(|_, _| {
            Ok(EntryInfo {
                value_type: 0,
                permission: *ADMIN_ROLE,
                immutable: false,
            })
        });
        reader
            .expect_get_address()
            .returning(move |_, _| Ok(module));
        let mut writer = MockRegistryWriting::new();
        writer
            .expect_set_address()
            .with(eq(REGISTRY), eq(key), eq(module), eq(*ADMIN_ROLE))
            .times(1)
            .returning(|_, _, _, _| Ok(B256::repeat_byte(2)));
        let registry = Registry::new(REGISTRY, Arc::new(reader), Arc::new(writer));

        let written = registry.assign_module("voting", module, &[]).await.unwrap();
        assert_eq!(written.entries.len(), 1);
        assert_eq!(written.entries[0].value, EntryValue::Address(module));
        assert!(written.entries[0].id.is_module());
    }
}
