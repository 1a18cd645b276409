//! Seam for the contact directory collaborator (an LDAP-backed CRUD store
//! maintained by a separate part of the system; out of scope here — see
//! SPEC_FULL.md section 1). Callers depend on the trait, not a concrete
//! LDAP client, so the lookup endpoint and any future history decoration can
//! be wired to a real implementation without touching this crate's core.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ContactRecord {
    pub uid: String,
    pub display_name: String,
    pub primary_phone: Option<String>,
    pub secondary_phone: Option<String>,
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn get_all(&self) -> Vec<ContactRecord>;
    async fn get(&self, uid: &str) -> Option<ContactRecord>;
    async fn search_by_phone(&self, number: &str) -> Option<ContactRecord>;
}

/// Empty directory used until a real LDAP-backed implementation is wired in.
#[derive(Debug, Default)]
pub struct NullDirectory;

#[async_trait]
impl ContactDirectory for NullDirectory {
    async fn get_all(&self) -> Vec<ContactRecord> {
        Vec::new()
    }

    async fn get(&self, _uid: &str) -> Option<ContactRecord> {
        None
    }

    async fn search_by_phone(&self, _number: &str) -> Option<ContactRecord> {
        None
    }
}
