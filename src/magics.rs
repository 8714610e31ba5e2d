//! Magic words: variables such as `{{PAGENAME}}` and the names under which parser functions are
//! invoked, including the localized aliases listed in the site info.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rustc_hash::FxHashMap;

use crate::{
    expander::{parser_fns::ParserFn, time},
    namespace::{talk_namespace, NsHandler, Title, NS_MAIN},
    siteinfo::SiteInfo,
    utils::{to_lowercase, url_encode, UrlEncoding},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicVariable {
    PageName,
    PageNameE,
    FullPageName,
    FullPageNameE,
    BasePageName,
    SubPageName,
    Namespace,
    NamespaceE,
    TalkPageName,
    SiteName,
    Server,
    ServerName,
    ScriptPath,
    ContentLanguage,
    Year,
    Month,
    Month1,
    MonthName,
    MonthAbbrev,
    Day,
    Day2,
    DayOfWeek,
    DayName,
    Time,
    Hour,
    Week,
    Timestamp,
    Pipe,
    Equals,
}

/// Magic word ids (as used in the site info) of all variables. `LOCAL*` variables are evaluated in
/// UTC, like their `CURRENT*` counterparts.
const VARIABLES: &[(&str, MagicVariable)] = &[
    ("pagename", MagicVariable::PageName),
    ("pagenamee", MagicVariable::PageNameE),
    ("fullpagename", MagicVariable::FullPageName),
    ("fullpagenamee", MagicVariable::FullPageNameE),
    ("basepagename", MagicVariable::BasePageName),
    ("subpagename", MagicVariable::SubPageName),
    ("namespace", MagicVariable::Namespace),
    ("namespacee", MagicVariable::NamespaceE),
    ("talkpagename", MagicVariable::TalkPageName),
    ("sitename", MagicVariable::SiteName),
    ("server", MagicVariable::Server),
    ("servername", MagicVariable::ServerName),
    ("scriptpath", MagicVariable::ScriptPath),
    ("contentlanguage", MagicVariable::ContentLanguage),
    ("currentyear", MagicVariable::Year),
    ("currentmonth", MagicVariable::Month),
    ("currentmonth1", MagicVariable::Month1),
    ("currentmonthname", MagicVariable::MonthName),
    ("currentmonthabbrev", MagicVariable::MonthAbbrev),
    ("currentday", MagicVariable::Day),
    ("currentday2", MagicVariable::Day2),
    ("currentdow", MagicVariable::DayOfWeek),
    ("currentdayname", MagicVariable::DayName),
    ("currenttime", MagicVariable::Time),
    ("currenthour", MagicVariable::Hour),
    ("currentweek", MagicVariable::Week),
    ("currenttimestamp", MagicVariable::Timestamp),
    ("localyear", MagicVariable::Year),
    ("localmonth", MagicVariable::Month),
    ("localmonth1", MagicVariable::Month1),
    ("localmonthname", MagicVariable::MonthName),
    ("localmonthabbrev", MagicVariable::MonthAbbrev),
    ("localday", MagicVariable::Day),
    ("localday2", MagicVariable::Day2),
    ("localdow", MagicVariable::DayOfWeek),
    ("localdayname", MagicVariable::DayName),
    ("localtime", MagicVariable::Time),
    ("localhour", MagicVariable::Hour),
    ("localweek", MagicVariable::Week),
    ("localtimestamp", MagicVariable::Timestamp),
    ("!", MagicVariable::Pipe),
    ("=", MagicVariable::Equals),
];

/// English spellings that are not simply the uppercased id.
const EXTRA_VARIABLE_NAMES: &[(&str, MagicVariable)] = &[
    ("CURRENTMONTH2", MagicVariable::Month),
    ("LOCALMONTH2", MagicVariable::Month),
    ("CONTENTLANG", MagicVariable::ContentLanguage),
];

const EXTRA_FUNCTION_NAMES: &[(&str, ParserFn)] = &[
    ("#date", ParserFn::Time),
    ("len", ParserFn::Len),
    ("sub", ParserFn::Sub),
];

#[derive(Debug, Clone)]
pub struct MagicWords {
    case_sensitive: FxHashMap<String, MagicVariable>,
    /// keys are lowercased
    case_insensitive: FxHashMap<String, MagicVariable>,
    /// keys are lowercased, `#` included where the function takes one
    functions: FxHashMap<String, ParserFn>,
}

impl MagicWords {
    pub fn new(site_info: &SiteInfo) -> Self {
        let mut case_sensitive = FxHashMap::default();
        let mut case_insensitive = FxHashMap::default();
        let mut functions = FxHashMap::default();

        for &(id, variable) in VARIABLES {
            case_sensitive.insert(id.to_uppercase(), variable);
        }
        for &(name, variable) in EXTRA_VARIABLE_NAMES {
            case_sensitive.insert(name.to_string(), variable);
        }
        for &func in ParserFn::ALL {
            functions.insert(func.name().to_string(), func);
        }
        for &(name, func) in EXTRA_FUNCTION_NAMES {
            functions.insert(name.to_string(), func);
        }

        for word in &site_info.magicwords {
            if let Some(&(_, variable)) = VARIABLES.iter().find(|(id, _)| *id == word.name.as_str()) {
                for alias in &word.aliases {
                    if word.case_sensitive {
                        case_sensitive.insert(alias.clone(), variable);
                    } else {
                        case_insensitive.insert(to_lowercase(alias), variable);
                    }
                }
            } else if let Some(func) = ParserFn::from_magic_id(&word.name) {
                for alias in &word.aliases {
                    let alias = to_lowercase(alias);
                    let key = if func.takes_hash() {
                        format!("#{}", alias.trim_start_matches('#'))
                    } else {
                        alias
                    };
                    functions.insert(key, func);
                }
            }
        }

        MagicWords {
            case_sensitive,
            case_insensitive,
            functions,
        }
    }

    pub fn variable(&self, name: &str) -> Option<MagicVariable> {
        self.case_sensitive
            .get(name)
            .or_else(|| self.case_insensitive.get(&to_lowercase(name)))
            .copied()
    }

    pub fn function(&self, name: &str) -> Option<ParserFn> {
        self.functions.get(&to_lowercase(name.trim())).copied()
    }
}

/// What magic variables are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub title: &'a Title,
    pub ns: &'a NsHandler,
    pub site_info: &'a SiteInfo,
    pub now: DateTime<Utc>,
}

impl PageContext<'_> {
    fn base_and_sub(&self) -> (&str, &str) {
        let text = self.title.text.as_str();
        if self.title.namespace == NS_MAIN {
            return (text, text);
        }
        match text.rsplit_once('/') {
            Some((base, sub)) => (base, sub),
            None => (text, text),
        }
    }

    fn namespace_name(&self) -> &str {
        self.ns
            .namespace_name(self.title.namespace)
            .unwrap_or_default()
    }

    fn full_page_name(&self) -> String {
        self.ns.join(self.title.namespace, &self.title.text)
    }

    fn server_name(&self) -> String {
        let general = &self.site_info.general;
        if !general.servername.is_empty() {
            return general.servername.clone();
        }
        let server = if general.server.starts_with("//") {
            format!("https:{}", general.server)
        } else {
            general.server.clone()
        };
        url::Url::parse(&server)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

pub fn evaluate(variable: MagicVariable, ctx: &PageContext<'_>) -> String {
    let lang = ctx.site_info.lang();
    let now = ctx.now;
    match variable {
        MagicVariable::PageName => ctx.title.text.clone(),
        MagicVariable::PageNameE => url_encode(&ctx.title.text, UrlEncoding::Wiki),
        MagicVariable::FullPageName => ctx.full_page_name(),
        MagicVariable::FullPageNameE => url_encode(&ctx.full_page_name(), UrlEncoding::Wiki),
        MagicVariable::BasePageName => ctx.base_and_sub().0.to_string(),
        MagicVariable::SubPageName => ctx.base_and_sub().1.to_string(),
        MagicVariable::Namespace => ctx.namespace_name().to_string(),
        MagicVariable::NamespaceE => url_encode(ctx.namespace_name(), UrlEncoding::Wiki),
        MagicVariable::TalkPageName => match talk_namespace(ctx.title.namespace) {
            Some(talk) => ctx.ns.join(talk, &ctx.title.text),
            None => String::new(),
        },
        MagicVariable::SiteName => ctx.site_info.general.sitename.clone(),
        MagicVariable::Server => ctx.site_info.general.server.clone(),
        MagicVariable::ServerName => ctx.server_name(),
        MagicVariable::ScriptPath => ctx.site_info.general.scriptpath.clone(),
        MagicVariable::ContentLanguage => lang.to_string(),
        MagicVariable::Year => now.year().to_string(),
        MagicVariable::Month => format!("{:02}", now.month()),
        MagicVariable::Month1 => now.month().to_string(),
        MagicVariable::MonthName => time::month_name(lang, now.month()).to_string(),
        MagicVariable::MonthAbbrev => time::month_abbrev(lang, now.month()).to_string(),
        MagicVariable::Day => now.day().to_string(),
        MagicVariable::Day2 => format!("{:02}", now.day()),
        MagicVariable::DayOfWeek => now.weekday().num_days_from_sunday().to_string(),
        MagicVariable::DayName => {
            time::day_name(lang, now.weekday().num_days_from_sunday()).to_string()
        }
        MagicVariable::Time => format!("{:02}:{:02}", now.hour(), now.minute()),
        MagicVariable::Hour => format!("{:02}", now.hour()),
        MagicVariable::Week => now.iso_week().week().to_string(),
        MagicVariable::Timestamp => now.format("%Y%m%d%H%M%S").to_string(),
        MagicVariable::Pipe => "|".to_string(),
        MagicVariable::Equals => "=".to_string(),
    }
}
