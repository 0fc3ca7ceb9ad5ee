use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Status reported by a game server in answer to a status request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub version_name: String,
    pub online_players: u32,
    pub max_players: u32,
    /// Raw banner text, formatting codes included.
    pub motd: String,
    pub sample_names: Vec<String>,
    pub latency_ms: Option<f64>,
}

/// What a successful probe hands back to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: ServerStatus,
    /// Whether the secondary capability query also answered.
    pub query_ok: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Public,
    LanExposed,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Public => f.write_str("Public server"),
            Category::LanExposed => f.write_str("LAN world (open to network)"),
        }
    }
}

/// One responsive server found on a host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassifiedResult {
    pub host: IpAddr,
    pub port: u16,
    pub status: ServerStatus,
    pub category: Category,
    pub query_ok: bool,
    /// Banner after formatting codes and extra whitespace were stripped.
    pub motd: String,
    pub observed_at: String,
}

impl ClassifiedResult {
    /// `host:port`, as written to the result file.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Field separator of the console result line.
pub const FIELD_SEPARATOR: &str = " │ ";

impl fmt::Display for ClassifiedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let latency = match self.status.latency_ms {
            Some(ms) => format!("{} ms", ms.round() as i64),
            None => "n/a".to_string(),
        };
        let mut fields = vec![
            self.endpoint(),
            self.status.version_name.clone(),
            format!("{}/{}", self.status.online_players, self.status.max_players),
            latency,
            format!("query:{}", self.query_ok),
            self.category.to_string(),
            format!("MOTD: {}", self.motd),
        ];
        if !self.status.sample_names.is_empty() {
            fields.push(format!("Players: {}", self.status.sample_names.join(", ")));
        }
        f.write_str(&fields.join(FIELD_SEPARATOR))
    }
}
