//! User registry: maps phone numbers and CLI identifiers to workflow users.
//!
//! In production this would be a database; for the demo it is a static table,
//! with WhatsApp numbers alongside CLI-only entries for local runs.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// A registered human participant in the workflow.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    /// Workflow role, also the history key for CLI users ("technician" / "office").
    pub role: &'static str,
    /// Display name for logging and prompt context.
    pub name: &'static str,
    /// Specialist agent this user's messages default to.
    pub default_agent: &'static str,
    /// WhatsApp number in Cloud API format (digits only), if reachable there.
    pub whatsapp: Option<&'static str>,
}

lazy_static! {
    static ref USER_REGISTRY: HashMap<&'static str, User> = {
        let mut m = HashMap::new();
        m.insert(
            "491718398683",
            User {
                role: "technician",
                name: "Michael",
                default_agent: "field_service",
                whatsapp: Some("491718398683"),
            },
        );
        m.insert(
            "19712187997",
            User {
                role: "office",
                name: "Klaus",
                default_agent: "office",
                whatsapp: Some("19712187997"),
            },
        );
        // CLI mode users
        m.insert(
            "technician",
            User {
                role: "technician",
                name: "Technician (CLI)",
                default_agent: "field_service",
                whatsapp: None,
            },
        );
        m.insert(
            "office",
            User {
                role: "office",
                name: "Office Staff (CLI)",
                default_agent: "office",
                whatsapp: None,
            },
        );
        m
    };
}

/// Look up a user by identifier (phone number or CLI role name).
pub fn lookup(user_id: &str) -> Option<&'static User> {
    USER_REGISTRY.get(user_id)
}

/// All registered user identifiers.
pub fn user_ids() -> Vec<&'static str> {
    USER_REGISTRY.keys().copied().collect()
}

/// WhatsApp numbers of every user holding the given role.
pub fn whatsapp_numbers_for_role(role: &str) -> Vec<&'static str> {
    let mut numbers: Vec<&'static str> = USER_REGISTRY
        .values()
        .filter(|u| u.role == role)
        .filter_map(|u| u.whatsapp)
        .collect();
    numbers.sort_unstable();
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_and_cli_ids_resolve_to_the_same_role() {
        assert_eq!(lookup("491718398683").unwrap().role, "technician");
        assert_eq!(lookup("technician").unwrap().role, "technician");
        assert!(lookup("unknown-number").is_none());
    }

    #[test]
    fn role_lookup_skips_cli_only_users() {
        assert_eq!(whatsapp_numbers_for_role("technician"), vec!["491718398683"]);
        assert_eq!(whatsapp_numbers_for_role("office"), vec!["19712187997"]);
        assert!(whatsapp_numbers_for_role("nobody").is_empty());
    }
}
