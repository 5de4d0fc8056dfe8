use std::fmt::{Display, Formatter};

use anyhow::{bail, Context, Result};
use arrayvec::ArrayString;
use chrono::{DateTime, Utc};
use redact::Secret;
use serde::{Deserialize, Serialize};

/// Identifies an app by its slug, as it appears in the URL.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Copy, Serialize, Deserialize)]
pub struct AppSlug(StackString<128>);
impl AppSlug {
    pub fn try_new<A: AsRef<str>>(key: A) -> Result<Self> {
        StackString::try_new(key)
            .map(AppSlug)
            .context("AppSlug is too long. Max 128 char")
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
impl Display for AppSlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub struct OrganizationId(pub u64);
impl Display for OrganizationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub struct InstallationId(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SentryApp {
    pub slug: AppSlug,
    pub owner: OrganizationId,
}

/// An installation of an app in an organization.
/// Deleted installations are kept, with `date_deleted` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    pub app: AppSlug,
    pub organization: OrganizationId,
    pub date_added: DateTime<Utc>,
    #[serde(default)]
    pub date_deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApiKey(Secret<StackString<64>>);
impl ApiKey {
    pub fn try_new<A: AsRef<str>>(key: A) -> Result<Self> {
        StackString::try_new(key.as_ref())
            .map(|s| ApiKey(Secret::new(s)))
            .context("API key is too long. Max 64 char")
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret().as_str()
    }
}
impl PartialEq for ApiKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}
impl Eq for ApiKey {}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Copy)]
pub struct StackString<const N: usize>(ArrayString<N>);
impl<const N: usize> Serialize for StackString<N> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.0.as_str().serialize(serializer)
    }
}
impl<'de, const N: usize> Deserialize<'de> for StackString<N> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        StackString::try_new(&s).map_err(serde::de::Error::custom)
    }
}
impl<const N: usize> StackString<N> {
    pub fn try_new<A: AsRef<str>>(key: A) -> Result<Self> {
        let key = key.as_ref();
        if key.is_empty() {
            bail!("StackString cannot be empty");
        }

        let mut s = ArrayString::<N>::new();
        let r = s.try_push_str(key);
        if let Err(e) = r {
            bail!("Parameter is too long. Max {} char. {:?}", N, e);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
impl<const N: usize> Display for StackString<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}
