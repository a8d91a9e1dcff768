//! The event planning crew
//!
//! Three roles, three tasks:
//!
//! | Task      | Role                               | Mode        | Confirmation | Output               |
//! |-----------|------------------------------------|-------------|--------------|----------------------|
//! | venue     | Venue Coordinator                  | synchronous | yes          | `venue_details.json` |
//! | logistics | Logistics Manager                  | concurrent  | yes          | -                    |
//! | marketing | Marketing and Communications Agent | concurrent  | no           | `marketing_report.md`|

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactFormat, ArtifactSpec};
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::role::{Capability, Role, RoleRegistry};
use crate::schema::OutputSchema;
use crate::task::Task;
use crate::template::Inputs;

pub const VENUE_COORDINATOR: &str = "Venue Coordinator";
pub const LOGISTICS_MANAGER: &str = "Logistics Manager";
pub const MARKETING_AGENT: &str = "Marketing and Communications Agent";

pub const VENUE_DETAILS_FILE: &str = "venue_details.json";
pub const MARKETING_REPORT_FILE: &str = "marketing_report.md";

/// Structured record the venue task must produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VenueDetails {
    /// Name of the venue
    pub name: String,
    /// Street address of the venue
    pub address: String,
    /// Number of people the venue can hold
    pub capacity: i64,
    /// Current booking status, e.g. "tentatively reserved"
    pub booking_status: String,
}

/// Input parameters for one planning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub event_topic: String,
    pub event_description: String,
    pub event_city: String,
    pub tentative_date: String,
    pub expected_participants: i64,
    pub budget: i64,
    pub venue_type: String,
}

impl Default for EventDetails {
    fn default() -> Self {
        Self {
            event_topic: "Tech Innovation Conference".to_string(),
            event_description:
                "A gathering of tech innovators and industry leaders to explore future technologies."
                    .to_string(),
            event_city: "San Francisco".to_string(),
            tentative_date: "2024-09-15".to_string(),
            expected_participants: 500,
            budget: 20000,
            venue_type: "Conference Hall".to_string(),
        }
    }
}

impl EventDetails {
    pub fn into_inputs(self) -> Inputs {
        Inputs::new()
            .with("event_topic", self.event_topic)
            .with("event_description", self.event_description)
            .with("event_city", self.event_city)
            .with("tentative_date", self.tentative_date)
            .with("expected_participants", self.expected_participants)
            .with("budget", self.budget)
            .with("venue_type", self.venue_type)
    }
}

/// Default inputs overlaid with the values from a TOML file
///
/// Keys absent from the file keep their defaults; extra keys are passed
/// through for custom task templates.
pub fn load_inputs(path: &Path) -> Result<Inputs> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let overrides: Inputs = toml::from_str(&content).map_err(|e| {
        PipelineError::configuration(format!("invalid inputs file {}: {}", path.display(), e))
    })?;

    let mut inputs = EventDetails::default().into_inputs();
    for (name, value) in overrides.iter() {
        inputs.insert(name, value.clone());
    }
    Ok(inputs)
}

/// The three crew roles, all with search and scrape
pub fn roles() -> Result<RoleRegistry> {
    RoleRegistry::new()
        .with_role(Role::new(
            VENUE_COORDINATOR,
            "Identify and book an appropriate venue based on event requirements",
            Capability::ALL,
            "With a keen sense of space and understanding of event logistics, you excel at \
             finding and securing the perfect venue that fits the event's theme, size, and \
             budget constraints.",
        )?)?
        .with_role(Role::new(
            LOGISTICS_MANAGER,
            "Manage all logistics for the event including catering and equipment",
            Capability::ALL,
            "Organized and detail-oriented, you ensure that every logistical aspect of the event \
             from catering to equipment setup is flawlessly executed to create a seamless \
             experience.",
        )?)?
        .with_role(Role::new(
            MARKETING_AGENT,
            "Effectively market the event and communicate with participants",
            Capability::ALL,
            "Creative and communicative, you craft compelling messages and engage with potential \
             attendees to maximize event exposure and participation.",
        )?)
}

/// Venue, logistics and marketing tasks in declared order
pub fn tasks() -> Vec<Task> {
    vec![
        Task::new(
            "Find a venue in {event_city} that meets criteria for {event_topic}.",
            "All the details of a specifically chosen venue you found to accommodate the event.",
            VENUE_COORDINATOR,
        )
        .with_human_confirmation()
        .with_output_schema(OutputSchema::of::<VenueDetails>())
        .with_output_file(VENUE_DETAILS_FILE),
        Task::new(
            "Coordinate catering and equipment for an event with {expected_participants} \
             participants on {tentative_date}.",
            "Confirmation of all logistics arrangements including catering and equipment setup.",
            LOGISTICS_MANAGER,
        )
        .concurrent()
        .with_human_confirmation(),
        Task::new(
            "Promote the {event_topic} aiming to engage at least {expected_participants} \
             potential attendees.",
            "Report on marketing activities and attendee engagement formatted as markdown.",
            MARKETING_AGENT,
        )
        .concurrent()
        .with_output_file(MARKETING_REPORT_FILE),
    ]
}

/// The assembled event planning pipeline
pub fn pipeline() -> Result<Pipeline> {
    Pipeline::assemble(roles()?, tasks())
}

/// Sections printed after the run
pub fn artifacts() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::new("Venue Details", VENUE_DETAILS_FILE, ArtifactFormat::Json),
        ArtifactSpec::new("Marketing Report", MARKETING_REPORT_FILE, ArtifactFormat::Text),
    ]
}
