//! Lowers the SCALE encoded `System.Events` storage value into plain event
//! records, using the runtime metadata of the same block to resolve types.

use frame_metadata::v14::{PalletStorageMetadata, StorageEntryType};
use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed};
use parity_scale_codec::Decode;
use scale_info::form::PortableForm;
use scale_value::{Composite, Primitive, Value, ValueDef, Variant};

use crate::error::DecodeError;

/// Position of an event inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventArg {
    Account([u8; 32]),
    Balance(u128),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub index: u32,
    pub phase: Phase,
    pub pallet: String,
    pub variant: String,
    pub fields: Vec<(Option<String>, EventArg)>,
}

impl EventRecord {
    pub fn is(&self, pallet: &str, variant: &str) -> bool {
        self.pallet == pallet && self.variant == variant
    }

    /// Looks an argument up by name, falling back to its position for
    /// runtimes that emit unnamed event fields.
    pub fn arg(&self, name: &str, position: usize) -> Option<&EventArg> {
        self.fields
            .iter()
            .find(|(field, _)| field.as_deref() == Some(name))
            .or_else(|| {
                self.fields
                    .get(position)
                    .filter(|(field, _)| field.is_none())
            })
            .map(|(_, arg)| arg)
    }

    pub fn account(&self, name: &str, position: usize) -> Option<[u8; 32]> {
        match self.arg(name, position) {
            Some(EventArg::Account(account)) => Some(*account),
            _ => None,
        }
    }

    pub fn balance(&self, name: &str, position: usize) -> Option<u128> {
        match self.arg(name, position) {
            Some(EventArg::Balance(balance)) => Some(*balance),
            _ => None,
        }
    }
}

pub fn decode_event_records(
    metadata: &[u8],
    raw: &[u8],
) -> Result<Vec<EventRecord>, DecodeError> {
    let prefixed = RuntimeMetadataPrefixed::decode(&mut &metadata[..])?;

    let (types, events_ty) = match prefixed.1 {
        RuntimeMetadata::V14(metadata) => {
            let ty = events_type_id(
                metadata
                    .pallets
                    .iter()
                    .map(|pallet| (pallet.name.as_str(), pallet.storage.as_ref())),
            );
            (metadata.types, ty)
        }
        RuntimeMetadata::V15(metadata) => {
            let ty = events_type_id(
                metadata
                    .pallets
                    .iter()
                    .map(|pallet| (pallet.name.as_str(), pallet.storage.as_ref())),
            );
            (metadata.types, ty)
        }
        _ => return Err(DecodeError::UnsupportedMetadata),
    };

    let events_ty = events_ty.ok_or(DecodeError::MissingEventsStorage)?;

    let value = scale_value::scale::decode_as_type(&mut &raw[..], events_ty, &types)
        .map_err(|e| DecodeError::Events(e.to_string()))?;

    lower_records(value)
}

fn events_type_id<'a>(
    mut pallets: impl Iterator<Item = (&'a str, Option<&'a PalletStorageMetadata<PortableForm>>)>,
) -> Option<u32> {
    let (_, storage) = pallets.find(|(name, _)| *name == "System")?;

    storage?
        .entries
        .iter()
        .find(|entry| entry.name == "Events")
        .and_then(|entry| match &entry.ty {
            StorageEntryType::Plain(ty) => Some(ty.id),
            StorageEntryType::Map { .. } => None,
        })
}

fn lower_records<T>(value: Value<T>) -> Result<Vec<EventRecord>, DecodeError> {
    let ValueDef::Composite(records) = value.value else {
        return Err(DecodeError::RecordShape(
            "event records are not a sequence".to_string(),
        ));
    };

    composite_values(records)
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let index = u32::try_from(index)
                .map_err(|_| DecodeError::RecordShape("too many events".to_string()))?;
            lower_record(index, record)
        })
        .collect()
}

fn lower_record<T>(index: u32, record: Value<T>) -> Result<EventRecord, DecodeError> {
    let ValueDef::Composite(Composite::Named(fields)) = record.value else {
        return Err(DecodeError::RecordShape(format!(
            "event record {index} has no named fields"
        )));
    };

    let mut phase = None;
    let mut event = None;
    for (name, value) in fields {
        match name.as_str() {
            "phase" => phase = Some(lower_phase(value)?),
            "event" => event = Some(value),
            _ => {}
        }
    }

    let phase =
        phase.ok_or_else(|| DecodeError::RecordShape(format!("event {index} has no phase")))?;
    let event =
        event.ok_or_else(|| DecodeError::RecordShape(format!("event {index} has no body")))?;

    let ValueDef::Variant(Variant {
        name: pallet,
        values: pallet_values,
    }) = event.value
    else {
        return Err(DecodeError::RecordShape(format!(
            "event {index} is not a pallet variant"
        )));
    };

    let Some(ValueDef::Variant(Variant {
        name: variant,
        values,
    })) = composite_values(pallet_values).into_iter().next().map(|v| v.value)
    else {
        return Err(DecodeError::RecordShape(format!(
            "event {index} of {pallet} has no event variant"
        )));
    };

    let fields = match values {
        Composite::Named(named) => named
            .into_iter()
            .map(|(name, value)| (Some(name), lower_arg(&value)))
            .collect(),
        Composite::Unnamed(unnamed) => unnamed
            .into_iter()
            .map(|value| (None, lower_arg(&value)))
            .collect(),
    };

    Ok(EventRecord {
        index,
        phase,
        pallet,
        variant,
        fields,
    })
}

fn lower_phase<T>(value: Value<T>) -> Result<Phase, DecodeError> {
    let ValueDef::Variant(Variant { name, values }) = value.value else {
        return Err(DecodeError::RecordShape("phase is not a variant".to_string()));
    };

    match name.as_str() {
        "ApplyExtrinsic" => {
            let extrinsic = composite_values(values)
                .into_iter()
                .next()
                .and_then(|value| match value.value {
                    ValueDef::Primitive(Primitive::U128(n)) => u32::try_from(n).ok(),
                    _ => None,
                })
                .ok_or_else(|| DecodeError::RecordShape("invalid extrinsic index".to_string()))?;
            Ok(Phase::ApplyExtrinsic(extrinsic))
        }
        "Finalization" => Ok(Phase::Finalization),
        "Initialization" => Ok(Phase::Initialization),
        other => Err(DecodeError::RecordShape(format!("unknown phase {other}"))),
    }
}

fn lower_arg<T>(value: &Value<T>) -> EventArg {
    if let ValueDef::Primitive(Primitive::U128(n)) = &value.value {
        return EventArg::Balance(*n);
    }

    let mut bytes = Vec::with_capacity(32);
    if !collect_bytes(value, &mut bytes) {
        return EventArg::Other;
    }

    <[u8; 32]>::try_from(bytes.as_slice()).map_or(EventArg::Other, EventArg::Account)
}

/// Flattens nested composites of byte-sized integers, such as `AccountId32([u8; 32])`.
fn collect_bytes<T>(value: &Value<T>, out: &mut Vec<u8>) -> bool {
    match &value.value {
        ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).map(|b| out.push(b)).is_ok(),
        ValueDef::Composite(Composite::Named(fields)) => {
            fields.iter().all(|(_, value)| collect_bytes(value, out))
        }
        ValueDef::Composite(Composite::Unnamed(values)) => {
            values.iter().all(|value| collect_bytes(value, out))
        }
        _ => false,
    }
}

fn composite_values<T>(composite: Composite<T>) -> Vec<Value<T>> {
    match composite {
        Composite::Named(fields) => fields.into_iter().map(|(_, value)| value).collect(),
        Composite::Unnamed(values) => values,
    }
}
