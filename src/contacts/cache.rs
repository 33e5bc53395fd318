use std::collections::BTreeMap;

use crate::ContactRecord;

/// Digits only; a 10-digit result gains a leading `1`. Other lengths are
/// returned as-is.
pub(crate) fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 {
        format!("1{digits}")
    } else {
        digits
    }
}

/// Name → phones and normalized phone → name, built from one full enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContactIndex {
    phones_by_name: BTreeMap<String, Vec<String>>,
    name_by_phone: BTreeMap<String, String>,
}

impl ContactIndex {
    pub(crate) fn from_records(records: &[ContactRecord]) -> Self {
        let mut index = Self::default();
        for record in records {
            index.insert(record);
        }
        index
    }

    pub(crate) fn insert(&mut self, record: &ContactRecord) {
        if record.name.is_empty() {
            return;
        }
        let phones = self.phones_by_name.entry(record.name.clone()).or_default();
        for entry in &record.phones {
            phones.push(entry.value.clone());
            let normalized = normalize_phone(&entry.value);
            if normalized.is_empty() {
                continue;
            }
            if normalized.len() == 11 && normalized.starts_with('1') {
                self.name_by_phone
                    .entry(normalized[1..].to_string())
                    .or_insert_with(|| record.name.clone());
            }
            self.name_by_phone
                .entry(normalized)
                .or_insert_with(|| record.name.clone());
        }
    }

    pub(crate) fn lookup_phone(&self, phone: &str) -> Option<&str> {
        let normalized = normalize_phone(phone);
        if normalized.is_empty() {
            return None;
        }
        self.name_by_phone.get(&normalized).map(String::as_str)
    }

    pub(crate) fn contact_count(&self) -> usize {
        self.phones_by_name.len()
    }

    pub(crate) fn phone_count(&self) -> usize {
        self.name_by_phone.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.phones_by_name.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CacheState {
    Empty,
    Loading,
    Ready(ContactIndex),
}

/// One-shot contact cache. Once `Ready` it is never rebuilt, even when the
/// load that produced it failed.
#[derive(Debug)]
pub(crate) struct ContactCache {
    state: CacheState,
}

impl Default for ContactCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactCache {
    pub(crate) fn new() -> Self {
        Self {
            state: CacheState::Empty,
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(self.state, CacheState::Ready(_))
    }

    /// Moves `Empty → Loading`. Returns false when a load already started.
    pub(crate) fn begin_load(&mut self) -> bool {
        if matches!(self.state, CacheState::Empty) {
            self.state = CacheState::Loading;
            true
        } else {
            false
        }
    }

    pub(crate) fn finish_load(&mut self, index: ContactIndex) {
        self.state = CacheState::Ready(index);
    }

    pub(crate) fn index(&self) -> Option<&ContactIndex> {
        match &self.state {
            CacheState::Ready(index) => Some(index),
            _ => None,
        }
    }
}
