//! LDAP client implementing the directory capability with `ldap3`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use tracing::{debug, info};

use dirsync_core::config::{AttributeMapping, DirectoryConfig};
use dirsync_core::directory::{DirectoryClient, EntryStream};
use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::directory::DirectoryEntry;

/// `userAccountControl` bit set on disabled Active Directory accounts.
const UAC_ACCOUNTDISABLE: u32 = 0x2;

/// Pseudo-attribute naming the entry's distinguished name.
const DN_ATTRIBUTE: &str = "dn";

/// Directory client for LDAP servers, including Active Directory.
///
/// Holds no connection state; every call connects and binds with the
/// configuration it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapDirectoryClient;

impl LdapDirectoryClient {
    pub fn new() -> Self {
        Self
    }
}

async fn connect(config: &DirectoryConfig) -> Result<Ldap> {
    let conn = &config.connection;
    let timeout = Duration::from_secs(conn.timeout_secs);
    let settings = LdapConnSettings::new()
        .set_conn_timeout(timeout)
        .set_starttls(conn.starttls)
        .set_no_tls_verify(!conn.tls_verify);

    let (ldap_conn, mut ldap) = LdapConnAsync::with_settings(settings, &conn.url)
        .await
        .map_err(|e| directory_error("LDAP connect failed", e))?;

    ldap3::drive!(ldap_conn);

    ldap.with_timeout(timeout)
        .simple_bind(&conn.bind_dn, &conn.bind_password)
        .await
        .map_err(|e| directory_error("LDAP bind failed", e))?
        .success()
        .map_err(|e| directory_error("LDAP bind rejected", e))?;

    if conn.bind_dn.is_empty() {
        debug!(url = %conn.url, "LDAP anonymous bind successful");
    } else {
        debug!(url = %conn.url, bind_dn = %conn.bind_dn, "LDAP bind successful");
    }
    Ok(ldap)
}

/// Map an `ldap3` error, keeping the LDAP result code when the server sent one.
fn directory_error(context: &str, e: LdapError) -> DirsyncError {
    let code = match &e {
        LdapError::LdapResult { result } => Some(result.rc),
        _ => None,
    };
    DirsyncError::Directory {
        code,
        message: format!("{context}: {e}"),
    }
}

fn search_entries<'a>(
    config: &'a DirectoryConfig,
) -> impl Stream<Item = Result<DirectoryEntry>> + Send + 'a {
    async_stream::try_stream! {
        let conn = &config.connection;
        let mut ldap = connect(config).await?;
        let attrs = config.attributes.requested_attributes();

        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(conn.page_size)),
        ];
        let mut search = ldap
            .streaming_search_with(adapters, &conn.base_dn, Scope::Subtree, &conn.user_filter, attrs)
            .await
            .map_err(|e| directory_error("LDAP search failed", e))?;

        let mut count = 0usize;
        while let Some(raw) = search
            .next()
            .await
            .map_err(|e| directory_error("LDAP search failed", e))?
        {
            let entry = SearchEntry::construct(raw);
            count += 1;
            yield entry_from_search(&entry, &config.attributes);
        }

        search
            .finish()
            .await
            .success()
            .map_err(|e| directory_error("LDAP search error", e))?;

        debug!(base_dn = %conn.base_dn, entries = count, "LDAP search finished");
        ldap.unbind().await.ok();
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectoryClient {
    async fn test_connection(&self, config: &DirectoryConfig) -> Result<()> {
        let mut ldap = connect(config).await?;
        ldap.unbind()
            .await
            .map_err(|e| directory_error("LDAP unbind failed", e))?;
        info!(url = %config.connection.url, "directory connection test successful");
        Ok(())
    }

    fn fetch_entries<'a>(&'a self, config: &'a DirectoryConfig) -> EntryStream<'a> {
        Box::pin(search_entries(config))
    }
}

/// Build a directory entry from a search result using the attribute mapping.
///
/// Missing attributes become `None` (or an empty external id); the planner
/// decides what is required.
fn entry_from_search(entry: &SearchEntry, mapping: &AttributeMapping) -> DirectoryEntry {
    let external_id = if mapping.external_id.eq_ignore_ascii_case(DN_ATTRIBUTE) {
        entry.dn.clone()
    } else {
        first_attr(&entry.attrs, &mapping.external_id)
            .or_else(|| first_bin_attr(&entry.bin_attrs, &mapping.external_id).map(to_hex))
            .unwrap_or_default()
    };

    let enabled = mapping
        .enabled
        .as_deref()
        .and_then(|attr| first_attr(&entry.attrs, attr))
        .map_or(true, |v| parse_enabled(&v));

    DirectoryEntry {
        external_id,
        username: mapped_attr(entry, &mapping.username),
        email: mapped_attr(entry, &mapping.email),
        display_name: mapping
            .display_name
            .as_deref()
            .and_then(|attr| mapped_attr(entry, attr)),
        enabled,
    }
}

fn mapped_attr(entry: &SearchEntry, attr: &str) -> Option<String> {
    if attr.eq_ignore_ascii_case(DN_ATTRIBUTE) {
        return Some(entry.dn.clone());
    }
    first_attr(&entry.attrs, attr)
}

/// Interpret an enabled-flag attribute: a numeric value is an AD
/// `userAccountControl` bitmask, anything else an LDAP boolean.
fn parse_enabled(value: &str) -> bool {
    let value = value.trim();
    if let Ok(uac) = value.parse::<u32>() {
        return uac & UAC_ACCOUNTDISABLE == 0;
    }
    !value.eq_ignore_ascii_case("false")
}

/// First value of an attribute. Attribute names are case-insensitive.
fn first_attr(attrs: &HashMap<String, Vec<String>>, name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.first())
        .cloned()
}

fn first_bin_attr<'e>(attrs: &'e HashMap<String, Vec<Vec<u8>>>, name: &str) -> Option<&'e [u8]> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.first())
        .map(Vec::as_slice)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldap3::LdapResult;

    fn search_entry(dn: &str, attrs: &[(&str, &str)]) -> SearchEntry {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in attrs {
            map.entry((*k).to_string()).or_default().push((*v).to_string());
        }
        SearchEntry {
            dn: dn.to_string(),
            attrs: map,
            bin_attrs: HashMap::new(),
        }
    }

    fn ad_mapping() -> AttributeMapping {
        AttributeMapping {
            external_id: "objectGUID".into(),
            username: "sAMAccountName".into(),
            email: "mail".into(),
            display_name: Some("displayName".into()),
            enabled: Some("userAccountControl".into()),
        }
    }

    #[test]
    fn maps_openldap_entry() {
        let entry = search_entry(
            "uid=alice,ou=people,dc=example,dc=com",
            &[
                ("entryUUID", "8f1c0d2e-0000-4000-8000-000000000001"),
                ("uid", "alice"),
                ("mail", "a@x.com"),
                ("cn", "Alice Smith"),
            ],
        );
        let mapped = entry_from_search(&entry, &AttributeMapping::default());
        assert_eq!(mapped.external_id, "8f1c0d2e-0000-4000-8000-000000000001");
        assert_eq!(mapped.username.as_deref(), Some("alice"));
        assert_eq!(mapped.email.as_deref(), Some("a@x.com"));
        assert_eq!(mapped.display_name.as_deref(), Some("Alice Smith"));
        assert!(mapped.enabled);
    }

    #[test]
    fn attribute_names_are_case_insensitive() {
        let entry = search_entry(
            "CN=Bob,OU=Staff,DC=example,DC=com",
            &[("samaccountname", "bob"), ("MAIL", "b@x.com")],
        );
        let mapped = entry_from_search(&entry, &ad_mapping());
        assert_eq!(mapped.username.as_deref(), Some("bob"));
        assert_eq!(mapped.email.as_deref(), Some("b@x.com"));
    }

    #[test]
    fn binary_external_id_is_hex_encoded() {
        let mut entry = search_entry("CN=Bob,DC=example,DC=com", &[("sAMAccountName", "bob")]);
        entry
            .bin_attrs
            .insert("objectGUID".into(), vec![vec![0xde, 0xad, 0x01, 0x0f]]);
        let mapped = entry_from_search(&entry, &ad_mapping());
        assert_eq!(mapped.external_id, "dead010f");
    }

    #[test]
    fn dn_can_be_the_external_id() {
        let entry = search_entry("uid=carol,dc=example,dc=com", &[("uid", "carol")]);
        let mapping = AttributeMapping {
            external_id: "dn".into(),
            ..Default::default()
        };
        let mapped = entry_from_search(&entry, &mapping);
        assert_eq!(mapped.external_id, "uid=carol,dc=example,dc=com");
    }

    #[test]
    fn missing_attributes_are_none() {
        let entry = search_entry("uid=x,dc=example,dc=com", &[]);
        let mapped = entry_from_search(&entry, &AttributeMapping::default());
        assert_eq!(mapped.external_id, "");
        assert!(mapped.username.is_none());
        assert!(mapped.email.is_none());
        assert!(mapped.enabled);
    }

    #[test]
    fn user_account_control_disabled_bit() {
        let entry = search_entry(
            "CN=Dave,DC=example,DC=com",
            &[("sAMAccountName", "dave"), ("userAccountControl", "514")],
        );
        assert!(!entry_from_search(&entry, &ad_mapping()).enabled);

        let entry = search_entry(
            "CN=Dave,DC=example,DC=com",
            &[("sAMAccountName", "dave"), ("userAccountControl", "66048")],
        );
        assert!(entry_from_search(&entry, &ad_mapping()).enabled);
    }

    #[test]
    fn boolean_enabled_values() {
        assert!(parse_enabled("TRUE"));
        assert!(!parse_enabled("FALSE"));
        assert!(!parse_enabled(" false "));
        assert!(parse_enabled("512"));
        assert!(!parse_enabled("2"));
    }

    #[test]
    fn ldap_result_code_is_kept() {
        let err = LdapError::LdapResult {
            result: LdapResult {
                rc: 49,
                matched: String::new(),
                text: "invalid credentials".into(),
                refs: vec![],
                ctrls: vec![],
            },
        };
        let mapped = directory_error("LDAP bind rejected", err);
        assert_eq!(mapped.directory_code(), Some(49));
        assert!(mapped.to_string().contains("LDAP bind rejected"));
    }

    #[test]
    fn hex_encoding() {
        assert_eq!(to_hex(&[]), "");
        assert_eq!(to_hex(&[0x00, 0xff, 0x10]), "00ff10");
    }
}
