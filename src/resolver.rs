//! The boundary between expansion and page storage.

use rustc_hash::FxHashMap;

use crate::{
    namespace::{NsHandler, NS_MAIN},
    siteinfo::SiteInfo,
};

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("I/O error while fetching {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("source of {name} is unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

/// Supplies template sources and site configuration to the expander.
///
/// Names passed in are canonical (see [`NsHandler::get_fqname`]). Errors are not fatal: the
/// expander logs them and treats the template as missing.
pub trait Resolver {
    fn get_template(&self, name: &str) -> Result<Option<String>, ResolverError>;

    fn page_exists(&self, name: &str) -> bool;

    fn site_info(&self) -> &SiteInfo;
}

impl<R: Resolver + ?Sized> Resolver for &R {
    fn get_template(&self, name: &str) -> Result<Option<String>, ResolverError> {
        (**self).get_template(name)
    }

    fn page_exists(&self, name: &str) -> bool {
        (**self).page_exists(name)
    }

    fn site_info(&self) -> &SiteInfo {
        (**self).site_info()
    }
}

/// A resolver over an in-memory page table.
#[derive(Debug, Clone)]
pub struct DictResolver {
    site_info: SiteInfo,
    ns: NsHandler,
    pages: FxHashMap<String, String>,
}

impl DictResolver {
    pub fn new(site_info: SiteInfo) -> Self {
        let ns = NsHandler::new(&site_info);
        DictResolver {
            site_info,
            ns,
            pages: FxHashMap::default(),
        }
    }

    /// Store a page; `name` is canonicalized, so `template:foo` and `Template:Foo` are the same.
    pub fn insert(&mut self, name: &str, text: impl Into<String>) {
        let name = self.ns.get_fqname(name, NS_MAIN);
        self.pages.insert(name, text.into());
    }

    pub fn with_page(mut self, name: &str, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl Resolver for DictResolver {
    fn get_template(&self, name: &str) -> Result<Option<String>, ResolverError> {
        Ok(self.pages.get(name).cloned())
    }

    fn page_exists(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }

    fn site_info(&self) -> &SiteInfo {
        &self.site_info
    }
}
