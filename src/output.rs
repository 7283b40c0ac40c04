use ldap3_proto::proto::{LdapPartialAttribute, LdapSearchResultEntry};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::io::{self, Write};

/// Values longer than this many bytes are elided in text output.
pub const LONG_VALUE_LIMIT: usize = 100;
pub const LONG_VALUE_PLACEHOLDER: &str = "<long>";

/// Values are kept as the directory sent them and only decoded for output,
/// so length checks see the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    #[serde(serialize_with = "serialize_lossy")]
    pub values: Vec<Vec<u8>>,
}

/// A search result entry, attributes in the order the directory sent them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

fn serialize_lossy<S: Serializer>(values: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(values.iter().map(|v| String::from_utf8_lossy(v)))
}

impl From<LdapPartialAttribute> for Attribute {
    fn from(a: LdapPartialAttribute) -> Self {
        Attribute {
            name: a.atype,
            values: a.vals,
        }
    }
}

impl From<LdapSearchResultEntry> for Entry {
    fn from(e: LdapSearchResultEntry) -> Self {
        Entry {
            dn: e.dn,
            attributes: e.attributes.into_iter().map(Attribute::from).collect(),
        }
    }
}

fn display_value(value: &[u8]) -> Cow<'_, str> {
    if value.len() > LONG_VALUE_LIMIT {
        Cow::Borrowed(LONG_VALUE_PLACEHOLDER)
    } else {
        String::from_utf8_lossy(value)
    }
}

pub fn write_entry<W: Write>(out: &mut W, entry: &Entry) -> io::Result<()> {
    writeln!(out, "dn: {}", entry.dn)?;
    for attr in &entry.attributes {
        for value in &attr.values {
            writeln!(out, "{}: {}", attr.name, display_value(value))?;
        }
    }
    Ok(())
}

/// Text dump: one block per entry, blocks separated by a single blank line.
pub fn write_entries<W: Write>(out: &mut W, entries: &[Entry]) -> io::Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        write_entry(out, entry)?;
    }
    out.flush()
}

pub fn write_entries_json<W: Write>(out: &mut W, entries: &[Entry]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, entries)?;
    writeln!(out)?;
    out.flush()
}
