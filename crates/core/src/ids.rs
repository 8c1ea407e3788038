//! Unique identifier generation.
//!
//! Every remote resource the orchestrator creates (job definition, job
//! queue, working-directory prefix) gets a freshly generated identifier
//! so that concurrent runs can never race over the same name.

/// Generate a fresh, URL- and path-safe unique identifier.
///
/// UUID v7 so identifiers created in sequence sort roughly by time,
/// which keeps backend consoles readable when many runs pile up.
pub fn create() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Derive a job name from a caller-supplied task name.
///
/// The result doubles as the log-stream prefix for the job, so it must
/// be unique per run even when the same task is executed twice.
pub fn job_name(task_name: &str) -> String {
    let slug: String = task_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();

    if slug.is_empty() {
        create()
    } else {
        format!("{slug}-{}", create())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_unique() {
        assert_ne!(create(), create());
    }

    #[test]
    fn job_name_keeps_task_name_prefix() {
        let name = job_name("my-task");
        assert!(name.starts_with("my-task-"));
        assert!(name.len() > "my-task-".len());
    }

    #[test]
    fn job_name_sanitizes_invalid_characters() {
        let name = job_name("a b/c");
        assert!(name.starts_with("a-b-c-"));
    }

    #[test]
    fn job_name_for_empty_task_name_is_still_unique() {
        let name = job_name("");
        assert!(!name.is_empty());
        assert_ne!(job_name(""), job_name(""));
    }
}
