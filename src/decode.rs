use std::collections::HashSet;

use crate::normalize::{default_categorical, normalize_identifier, normalize_phone, NULL_SENTINEL};

/// Default for empty service_type / training_group fields.
pub const DEFAULT_CATEGORY: &str = "Primary";

/// Provenance label stamped on every batch row created by this importer.
pub const COORDINATOR_LABEL: &str = "Production Import";

/// Expected positional layout of one input row:
/// district, batch name, service type, training group, teacher id,
/// teacher name, phone.
pub const EXPECTED_FIELDS: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct TeacherRecord {
    pub teacher_id: Option<String>,
    pub teacher_name: String,
    pub mobile: String,
    pub district: String,
    pub service_type: String,
    pub training_group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub batch_name: String,
    pub district: String,
    pub coordinator_name: String,
    pub service_type: String,
    pub training_group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub batch_name: String,
    pub teacher_mobile: String,
    pub teacher_name: String,
    pub district: String,
}

/// Batch names already queued during this run. Source rows repeat batch names
/// freely; only the first occurrence may emit a `BatchRecord`.
#[derive(Debug, Default)]
pub struct SeenBatches(HashSet<String>);

impl SeenBatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a name is offered, false afterwards.
    pub fn mark(&mut self, name: &str) -> bool {
        if self.0.contains(name) {
            return false;
        }
        self.0.insert(name.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything one surviving input row contributes to the store.
#[derive(Debug)]
pub struct DecodedRow {
    pub teacher: TeacherRecord,
    pub batch: Option<BatchRecord>,
    pub link: Option<LinkRecord>,
}

/// Turn one raw row into candidates, or reject it.
///
/// Rows with fewer than 7 fields or an unusable phone yield `None`. A
/// surviving row always yields a teacher; it yields a batch only the first
/// time its batch name is seen, and a link whenever a non-null batch name is
/// present regardless of dedup state.
pub fn decode_row(record: &csv::StringRecord, seen: &mut SeenBatches) -> Option<DecodedRow> {
    if record.len() < EXPECTED_FIELDS {
        return None;
    }

    let district = record.get(0).unwrap_or("");
    let batch_name = record.get(1).unwrap_or("");
    let service_type = record.get(2).unwrap_or("");
    let training_group = record.get(3).unwrap_or("");
    let teacher_id = record.get(4).unwrap_or("");
    let teacher_name = record.get(5).unwrap_or("");
    let phone = record.get(6).unwrap_or("");

    let mobile = normalize_phone(phone)?;
    let service_type = default_categorical(service_type, DEFAULT_CATEGORY);
    let training_group = default_categorical(training_group, DEFAULT_CATEGORY);

    let teacher = TeacherRecord {
        teacher_id: normalize_identifier(teacher_id),
        teacher_name: teacher_name.to_string(),
        mobile: mobile.clone(),
        district: district.to_string(),
        service_type: service_type.clone(),
        training_group: training_group.clone(),
    };

    let has_batch = !batch_name.is_empty() && batch_name != NULL_SENTINEL;

    let batch = if has_batch && seen.mark(batch_name) {
        Some(BatchRecord {
            batch_name: batch_name.to_string(),
            district: district.to_string(),
            coordinator_name: COORDINATOR_LABEL.to_string(),
            service_type,
            training_group,
        })
    } else {
        None
    };

    let link = if has_batch {
        Some(LinkRecord {
            batch_name: batch_name.to_string(),
            teacher_mobile: mobile,
            teacher_name: teacher_name.to_string(),
            district: district.to_string(),
        })
    } else {
        None
    };

    Some(DecodedRow {
        teacher,
        batch,
        link,
    })
}
