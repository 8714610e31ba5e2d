//! Site configuration: namespaces, aliases, magic words and the interwiki map.
//!
//! The JSON layout is the one returned by the MediaWiki API
//! (`action=query&meta=siteinfo&siprop=general|namespaces|namespacealiases|magicwords|interwikimap`),
//! either bare or wrapped in its `{"query": …}` envelope.

use std::{
    collections::BTreeMap,
    fs,
    io::BufRead,
    path::{Path, PathBuf},
};

use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Deserializer, Serialize};

static BUILTIN_EN: &str = include_str!("../siteinfo/siteinfo-en.json");
static BUILTIN_DE: &str = include_str!("../siteinfo/siteinfo-de.json");

#[derive(Debug, thiserror::Error)]
pub enum SiteInfoError {
    #[error("failed to read site info from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid site info JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid XML in dump header: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("no site info is available for language {0:?}")]
    UnknownLanguage(String),
    #[error("the dump header ended before </siteinfo>")]
    UnexpectedEof,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct General {
    pub sitename: String,
    pub lang: String,
    pub base: String,
    pub server: String,
    pub servername: String,
    pub scriptpath: String,
    pub articlepath: String,
    pub mainpage: String,
    pub dbname: String,
    pub case: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub id: i32,
    #[serde(default = "default_case")]
    pub case: String,
    #[serde(rename = "*", default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
}

fn default_case() -> String {
    "first-letter".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceAlias {
    pub id: i32,
    #[serde(rename = "*")]
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicWordInfo {
    pub name: CompactString,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(
        default,
        alias = "case-sensitive",
        deserialize_with = "deserialize_flag"
    )]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterwikiEntry {
    pub prefix: String,
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub local: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub trans: bool,
}

/// The API encodes boolean flags either as JSON booleans or as a present empty string.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(serde::de::IgnoredAny),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Str(_) => true,
        Flag::Int(i) => i != 0,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteInfo {
    pub general: General,
    pub namespaces: BTreeMap<i32, NamespaceInfo>,
    pub namespacealiases: Vec<NamespaceAlias>,
    pub magicwords: Vec<MagicWordInfo>,
    pub interwikimap: Vec<InterwikiEntry>,
}

impl SiteInfo {
    pub fn from_json(json: &str) -> Result<Self, SiteInfoError> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(query) = value.get_mut("query") {
            value = query.take();
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Site info bundled with the crate (`en` and `de`).
    pub fn builtin(lang: &str) -> Result<Self, SiteInfoError> {
        match lang {
            "en" => Self::from_json(BUILTIN_EN),
            "de" => Self::from_json(BUILTIN_DE),
            _ => Err(SiteInfoError::UnknownLanguage(lang.to_string())),
        }
    }

    /// Load `siteinfo-<lang>.json` from `dir`.
    pub fn load_for_lang(dir: &Path, lang: &str) -> Result<Self, SiteInfoError> {
        if lang.is_empty()
            || !lang
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(SiteInfoError::UnknownLanguage(lang.to_string()));
        }

        let path = dir.join(format!("siteinfo-{lang}.json"));
        let json = fs::read_to_string(&path).map_err(|source| SiteInfoError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Read the `<siteinfo>` block at the start of a MediaWiki XML export.
    ///
    /// Dumps carry neither aliases nor magic words, so only `general` and `namespaces` are filled.
    /// The language is derived from the host of `<base>` (`de.wikipedia.org` gives `de`).
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn from_dump_header<R: BufRead>(reader: R) -> Result<Self, SiteInfoError> {
        let mut xml_parser = quick_xml::Reader::from_reader(reader);
        let mut buf = Vec::new();
        let mut current_path: Vec<HeaderTag> = Vec::new();
        let mut site_info = SiteInfo::default();

        loop {
            match xml_parser.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    current_path.push(HeaderTag::from_start(e)?);
                }
                Event::Empty(ref e) => {
                    if let HeaderTag::Namespace { key, case } = HeaderTag::from_start(e)? {
                        if current_path.ends_with(&[HeaderTag::SiteInfo, HeaderTag::Namespaces]) {
                            site_info.insert_dump_namespace(key, case, String::new());
                        }
                    }
                }
                Event::Text(e) => {
                    let text = e.unescape()?;
                    match current_path.as_slice() {
                        [.., HeaderTag::SiteInfo, HeaderTag::Field(field)] => {
                            site_info.set_dump_field(field, text.as_ref());
                        }
                        [.., HeaderTag::SiteInfo, HeaderTag::Namespaces, HeaderTag::Namespace { key, case }] => {
                            site_info.insert_dump_namespace(key.clone(), case.clone(), text.into_owned());
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    current_path.pop();
                    if e.name().as_ref() == b"siteinfo" {
                        break;
                    }
                }
                Event::Eof => {
                    tracing::error!(partial_site_info = ?site_info, current_path = ?current_path);
                    return Err(SiteInfoError::UnexpectedEof);
                }
                _ => {}
            }
            buf.clear();
        }

        site_info.derive_from_base();
        Ok(site_info)
    }

    fn set_dump_field(&mut self, field: &DumpField, text: &str) {
        let general = &mut self.general;
        match field {
            DumpField::SiteName => general.sitename = text.to_string(),
            DumpField::DbName => general.dbname = text.to_string(),
            DumpField::Base => general.base = text.to_string(),
            DumpField::Case => general.case = text.to_string(),
            DumpField::Other => {}
        }
    }

    fn insert_dump_namespace(&mut self, key: String, case: Option<String>, name: String) {
        let Ok(id) = key.parse::<i32>() else {
            tracing::warn!(
                message = "Ignoring namespace with invalid id",
                id = key.as_str(),
                name = name.as_str()
            );
            return;
        };
        self.namespaces.insert(
            id,
            NamespaceInfo {
                id,
                case: case.unwrap_or_else(default_case),
                name,
                canonical: None,
            },
        );
    }

    fn derive_from_base(&mut self) {
        let Ok(base) = url::Url::parse(&self.general.base) else {
            if !self.general.base.is_empty() {
                tracing::warn!(
                    message = "Unparsable <base> in dump header",
                    base = self.general.base.as_str()
                );
            }
            return;
        };

        let general = &mut self.general;
        if let Some(host) = base.host_str() {
            general.servername = host.to_string();
            general.server = format!("{}://{host}", base.scheme());
            let labels: Vec<&str> = host.split('.').collect();
            if labels.len() >= 3 && labels[0] != "www" {
                general.lang = labels[0].to_string();
            }
        }
        if let Some(page) = base.path().strip_prefix("/wiki/") {
            general.articlepath = "/wiki/$1".to_string();
            general.scriptpath = "/w".to_string();
            let page = url::form_urlencoded::parse(format!("x={page}").as_bytes())
                .next()
                .map(|(_, v)| v.replace('_', " "))
                .unwrap_or_default();
            general.mainpage = page;
        }
    }

    pub fn lang(&self) -> &str {
        if self.general.lang.is_empty() {
            "en"
        } else {
            &self.general.lang
        }
    }

    pub fn namespace(&self, id: i32) -> Option<&NamespaceInfo> {
        self.namespaces.get(&id)
    }

    pub fn magic_word(&self, name: &str) -> Option<&MagicWordInfo> {
        self.magicwords.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DumpField {
    SiteName,
    DbName,
    Base,
    Case,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderTag {
    SiteInfo,
    Namespaces,
    Namespace { key: String, case: Option<String> },
    Field(DumpField),
    Unknown,
}

impl HeaderTag {
    fn from_start(e: &BytesStart) -> Result<Self, quick_xml::Error> {
        Ok(match e.name().as_ref() {
            b"siteinfo" => HeaderTag::SiteInfo,
            b"namespaces" => HeaderTag::Namespaces,
            b"namespace" => {
                let mut key = None;
                let mut case = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    match attr.key.as_ref() {
                        b"key" => key = Some(attr.unescape_value()?.into_owned()),
                        b"case" => case = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                match key {
                    Some(key) => HeaderTag::Namespace { key, case },
                    None => {
                        tracing::warn!(message = "Ignoring <namespace> without key attribute");
                        HeaderTag::Unknown
                    }
                }
            }
            b"sitename" => HeaderTag::Field(DumpField::SiteName),
            b"dbname" => HeaderTag::Field(DumpField::DbName),
            b"base" => HeaderTag::Field(DumpField::Base),
            b"case" => HeaderTag::Field(DumpField::Case),
            b"generator" => HeaderTag::Field(DumpField::Other),
            _ => HeaderTag::Unknown,
        })
    }
}
