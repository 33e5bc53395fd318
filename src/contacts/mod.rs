//! macOS Contacts bridge: AppleScript generation, decoding of its delimited
//! output, and a one-shot phone → name cache.

pub(crate) mod cache;
pub(crate) mod decode;
pub(crate) mod script;

pub(crate) use cache::*;
pub(crate) use decode::*;
pub(crate) use script::*;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    ContactPage, ContactRecord, ContactsConfig, Pagination, PhoneLookup, ScriptError,
    ScriptRunner, send_imessage,
};

/// Result of the lightweight `count of people` probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PermissionStatus {
    pub(crate) has_permission: bool,
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) remediation: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

pub(crate) struct ContactBridge {
    runner: Box<dyn ScriptRunner>,
    config: ContactsConfig,
    cache: ContactCache,
}

impl ContactBridge {
    pub(crate) fn new(runner: Box<dyn ScriptRunner>, config: ContactsConfig) -> Self {
        Self {
            runner,
            config,
            cache: ContactCache::new(),
        }
    }

    pub(crate) fn cache(&self) -> &ContactCache {
        &self.cache
    }

    pub(crate) fn count(&self) -> Result<usize, ScriptError> {
        let raw = self.runner.run(&count_script(), self.config.count_timeout())?;
        Ok(parse_count(&raw)?)
    }

    pub(crate) fn check_permission(&self) -> PermissionStatus {
        match self.runner.run(&count_script(), self.config.probe_timeout()) {
            Ok(_) => PermissionStatus {
                has_permission: true,
                message: "Contacts access is granted".to_string(),
                remediation: None,
                error: None,
            },
            Err(ScriptError::PermissionDenied { code, remediation }) => {
                debug!(code, "contacts automation denied");
                PermissionStatus {
                    has_permission: false,
                    message: "Contacts access is denied for this application".to_string(),
                    remediation: Some(remediation.iter().map(|s| s.to_string()).collect()),
                    error: None,
                }
            }
            Err(err) => PermissionStatus {
                has_permission: false,
                message: "Could not verify Contacts access".to_string(),
                remediation: None,
                error: Some(err.to_string()),
            },
        }
    }

    pub(crate) fn page(&self, offset: usize, limit: usize) -> Result<ContactPage, ScriptError> {
        let raw = self
            .runner
            .run(&page_script(offset, Some(limit)), self.config.query_timeout())?;
        let decoded = decode_page(&raw)?;
        if let PageHeader::Data { returned, .. } = decoded.header {
            if returned != decoded.records.len() {
                warn!(
                    declared = returned,
                    decoded = decoded.records.len(),
                    "contacts page record count differs from its header"
                );
            }
        }
        Ok(ContactPage {
            pagination: Pagination::new(offset, limit, decoded.header.total()),
            contacts: decoded.records,
        })
    }

    /// `whose name contains` first; when that finds nothing, scan the first
    /// `fallback_scan` people for a containment match in either direction.
    pub(crate) fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<ContactRecord>, ScriptError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .runner
            .run(&search_script(name, limit), self.config.query_timeout())?;
        let mut found = decode_page(&raw)?.records;

        if found.is_empty() {
            debug!(name, window = self.config.fallback_scan, "name search falling back to scan");
            let raw = self.runner.run(
                &page_script(0, Some(self.config.fallback_scan)),
                self.config.query_timeout(),
            )?;
            let needle = name.to_lowercase();
            found = decode_page(&raw)?
                .records
                .into_iter()
                .filter(|record| {
                    let candidate = record.name.to_lowercase();
                    !candidate.is_empty()
                        && (needle.contains(&candidate) || candidate.contains(&needle))
                })
                .collect();
        }

        found.truncate(limit);
        Ok(found)
    }

    fn load_all(&self) -> Result<Vec<ContactRecord>, ScriptError> {
        let raw = self
            .runner
            .run(&page_script(0, None), self.config.load_timeout())?;
        Ok(decode_page(&raw)?.records)
    }

    /// Populate the phone index on first use. A failed load leaves an empty
    /// ready index behind and is not retried.
    pub(crate) fn ensure_loaded(&mut self) {
        if self.cache.is_ready() || !self.cache.begin_load() {
            return;
        }
        let index = match self.load_all() {
            Ok(records) => {
                let index = ContactIndex::from_records(&records);
                if index.is_empty() {
                    warn!("contact cache loaded with no named contacts");
                } else {
                    info!(
                        contacts = index.contact_count(),
                        phones = index.phone_count(),
                        "contact cache loaded"
                    );
                }
                index
            }
            Err(err) => {
                warn!(error = %err, "contact cache load failed; continuing without contact names");
                ContactIndex::default()
            }
        };
        self.cache.finish_load(index);
    }

    pub(crate) fn match_phone(&mut self, phone: &str) -> Option<String> {
        self.ensure_loaded();
        self.cache
            .index()
            .and_then(|index| index.lookup_phone(phone))
            .map(str::to_string)
    }

    pub(crate) fn find_by_phone(&mut self, phone: &str) -> PhoneLookup {
        let name = self.match_phone(phone);
        PhoneLookup {
            phone: phone.to_string(),
            normalized: normalize_phone(phone),
            found: name.is_some(),
            name,
        }
    }

    pub(crate) fn send_message(&self, recipient: &str, message: &str) -> Result<(), ScriptError> {
        send_imessage(
            &*self.runner,
            recipient,
            message,
            self.config.send_timeout(),
        )
    }
}
