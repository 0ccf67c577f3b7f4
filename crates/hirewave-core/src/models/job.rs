use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Active,
    Paused,
    Closed,
    Draft,
}

impl JobStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            JobStatus::Active => "Active",
            JobStatus::Paused => "Paused",
            JobStatus::Closed => "Closed",
            JobStatus::Draft => "Draft",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Job {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub salary: String,
    /// full-time, part-time, contract, internship or remote
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub external_link: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Job {
    /// "Title - Company" line used in listings
    pub fn headline(&self) -> String {
        if self.company.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.company)
        }
    }
}

/// Partial update sent with `PUT /jobs/{id}/`; unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
}
