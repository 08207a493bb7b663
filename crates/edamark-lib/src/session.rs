use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Identifies a recording by participant, session and sensor placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub participant: String,
    pub session: u32,
    pub placement: String,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_s{}_{}", self.participant, self.session, self.placement)
    }
}

impl FromStr for SessionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, placement) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("session key '{}' lacks a placement", s))?;
        let (participant, session) = rest
            .rsplit_once("_s")
            .ok_or_else(|| format!("session key '{}' lacks a _s<index> part", s))?;
        let session = session
            .parse()
            .map_err(|_| format!("session index '{}' is not a number", session))?;
        Ok(Self {
            participant: participant.to_string(),
            session,
            placement: placement.to_string(),
        })
    }
}

impl Serialize for SessionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_placement_token() -> usize {
    1
}

/// One `[[session]]` entry: which recordings belong to a session and which
/// event logs (by file stem, in chronological order) apply to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRoute {
    /// Filename token that selects this route, e.g. `Session1`.
    pub tag: String,
    pub participant: String,
    pub session: u32,
    /// Position of the placement token in the `_`-separated filename stem.
    #[serde(default = "default_placement_token")]
    pub placement_token: usize,
    pub logs: Vec<String>,
    #[serde(default)]
    pub sampling_rate: Option<u32>,
    /// Per-placement rate overrides (e.g. `palm = 1024`).
    #[serde(default)]
    pub placement_rates: BTreeMap<String, u32>,
}

impl SessionRoute {
    /// Sampling rate for a placement under this route.
    pub fn rate_for(&self, placement: &str, default_rate: u32) -> u32 {
        self.placement_rates
            .get(placement)
            .copied()
            .or(self.sampling_rate)
            .unwrap_or(default_rate)
    }
}

/// Static lookup from recordings to their event logs. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<SessionRoute>,
}

impl RoutingTable {
    pub fn new(routes: Vec<SessionRoute>) -> Result<Self, ConfigError> {
        let mut tags = HashSet::new();
        let mut sessions: HashMap<(&str, u32), &str> = HashMap::new();
        for route in &routes {
            if route.logs.is_empty() {
                return Err(ConfigError::RouteWithoutLogs(route.tag.clone()));
            }
            if !tags.insert(route.tag.as_str()) {
                return Err(ConfigError::DuplicateTag(route.tag.clone()));
            }
            let pair = (route.participant.as_str(), route.session);
            if let Some(first) = sessions.insert(pair, route.tag.as_str()) {
                return Err(ConfigError::DuplicateSession {
                    participant: route.participant.clone(),
                    session: route.session,
                    first: first.to_string(),
                    second: route.tag.clone(),
                });
            }
        }
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[SessionRoute] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Derive the session key for a recording file name.
    pub fn resolve(&self, file_name: &str) -> Option<(SessionKey, &SessionRoute)> {
        let stem = Path::new(file_name).file_stem()?.to_str()?;
        let tokens: Vec<&str> = stem.split('_').collect();
        let route = self
            .routes
            .iter()
            .find(|route| tokens.iter().any(|t| *t == route.tag))?;
        let placement = tokens.get(route.placement_token)?;
        if placement.is_empty() || *placement == route.tag {
            return None;
        }
        let key = SessionKey {
            participant: route.participant.clone(),
            session: route.session,
            placement: placement.to_ascii_lowercase(),
        };
        Some((key, route))
    }

    fn route_for(&self, key: &SessionKey) -> Option<&SessionRoute> {
        self.routes
            .iter()
            .find(|r| r.participant == key.participant && r.session == key.session)
    }

    pub fn logs_for(&self, key: &SessionKey) -> Option<&[String]> {
        self.route_for(key).map(|r| r.logs.as_slice())
    }

    pub fn rate_for(&self, key: &SessionKey, default_rate: u32) -> u32 {
        self.route_for(key)
            .map(|r| r.rate_for(&key.placement, default_rate))
            .unwrap_or(default_rate)
    }
}
