use crate::error::{ReportError, ReportResult};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// How rows of a category are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    /// Each key is a distinct named metric.
    Totals,
    /// Each key is a bucket to rank by summed value.
    Breakdown,
}

/// The fixed set of statistic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Totals,
    BrowserVersions,
    OperatingSystemVersions,
    SocialSources,
    Languages,
    Country,
}

impl Category {
    /// The breakdown categories, in report order.
    pub const BREAKDOWNS: [Self; 5] = [
        Self::BrowserVersions,
        Self::OperatingSystemVersions,
        Self::SocialSources,
        Self::Languages,
        Self::Country,
    ];

    /// The `stat_name` stored for this category.
    pub const fn stat_name(self) -> &'static str {
        match self {
            Self::Totals => "Totals",
            Self::BrowserVersions => "Browser versions",
            Self::OperatingSystemVersions => "Operating Systems versions",
            Self::SocialSources => "Social sources",
            Self::Languages => "Languages",
            Self::Country => "Country",
        }
    }

    /// Short name used as the report section field.
    pub const fn section(self) -> &'static str {
        match self {
            Self::Totals => "totals",
            Self::BrowserVersions => "browsers",
            Self::OperatingSystemVersions => "os",
            Self::SocialSources => "social_networks",
            Self::Languages => "languages",
            Self::Country => "country",
        }
    }

    pub const fn kind(self) -> CategoryKind {
        match self {
            Self::Totals => CategoryKind::Totals,
            _ => CategoryKind::Breakdown,
        }
    }

    /// Map a raw key to the bucket it is grouped under.
    pub fn normalize_key(self, key: &str) -> ReportResult<Cow<'_, str>> {
        match self {
            Self::BrowserVersions => normalize_browser_key(key).map(Cow::Owned),
            _ => Ok(Cow::Borrowed(key)),
        }
    }
}

impl FromStr for Category {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Totals]
            .into_iter()
            .chain(Self::BREAKDOWNS)
            .find(|c| c.stat_name() == s || c.section() == s)
            .ok_or_else(|| ReportError::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stat_name())
    }
}

/// Browsers whose version numbers are build numbers, bucketed as `NNX`.
const BUILD_NUMBER_BROWSERS: [&str; 2] = ["Safari", "Android Browser"];

/// Collapse a `"<Name> (<version>)"` key to a coarse version bucket.
///
/// - `Chrome (36.0.1985)` → `Chrome (36)`
/// - `Firefox (3.6.28)` → `Firefox (3.6)`
/// - `Safari (536.30.1)` → `Safari (53X)`
pub fn normalize_browser_key(key: &str) -> ReportResult<String> {
    let malformed = || ReportError::MalformedBrowserKey(key.to_string());
    let close = key.rfind(')').ok_or_else(malformed)?;
    let open = key[..close].rfind('(').ok_or_else(malformed)?;
    let browser = key[..open].trim();
    let raw_version = &key[open + 1..close];

    let parts: Vec<&str> = raw_version.split('.').collect();
    let major = parts[0];

    let version = if BUILD_NUMBER_BROWSERS.contains(&browser) {
        if major.chars().count() > 2 {
            let prefix: String = major.chars().take(2).collect();
            format!("{prefix}X")
        } else {
            major.to_string()
        }
    } else if parts.len() > 1 {
        // A minor starting with 0 carries no information at this granularity
        let minor = parts[1];
        if minor.is_empty() || minor.starts_with('0') {
            major.to_string()
        } else {
            format!("{major}.{minor}")
        }
    } else {
        raw_version.to_string()
    };

    Ok(format!("{browser} ({version})"))
}
