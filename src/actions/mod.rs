// ABOUTME: Standalone CI helper actions bundled next to the file sync
// ABOUTME: File reading, CLA records, durations, release notes, Allure reports, membership checks

pub mod allure;
pub mod cla;
pub mod durations;
pub mod error;
pub mod membership;
pub mod read_file;
pub mod release_notes;

pub use allure::{allure_multi, AllureOptions, WorkflowRun};
pub use cla::{add_signee, load_signees, Signees};
pub use durations::{combine_durations, DurationStats};
pub use error::{ActionError, Result};
pub use membership::{issue_in_project, user_in_team, Membership, ProjectIssue, ProjectOwner};
pub use read_file::{parse_content, read_file, ContentParser};
pub use release_notes::{extract_release_notes, write_release_notes};
