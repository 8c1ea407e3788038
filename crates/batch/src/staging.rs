//! File staging between the local working directory and blob storage.
//!
//! A [`StagingPlan`] pins down the per-run blob prefix and the file
//! lists; [`upload_all`] runs before submission and [`download_all`]
//! after a successful terminal status. Both issue every transfer
//! concurrently and join them all before returning, so the dependent
//! step never starts on a partial transfer set.

use std::path::Path;

use strato_core::ids;

use crate::backend::BlobStore;
use crate::error::RunnerError;

/// Where one run's staged files live, remotely and in blob storage.
///
/// Created once per run with a freshly generated working directory, so
/// concurrent runs never collide on keys. Immutable thereafter.
#[derive(Debug, Clone)]
pub struct StagingPlan {
    pub bucket: String,
    /// Remote working directory inside the shared volume, `/<id>`.
    /// Mirrored as the blob key prefix for everything the run stages.
    pub working_dir: String,
    /// Remote output directory, a sub-path of the working directory.
    pub output_dir: String,
    /// Paths relative to the working directory to upload beforehand.
    pub files_to_upload: Vec<String>,
    /// Paths relative to the working directory to download afterwards.
    pub files_to_download: Vec<String>,
}

impl StagingPlan {
    pub fn new(
        bucket: &str,
        files_to_upload: Vec<String>,
        files_to_download: Vec<String>,
    ) -> Self {
        let working_dir = format!("/{}", ids::create());
        let output_dir = format!("{working_dir}/{}", ids::create());
        Self {
            bucket: bucket.to_owned(),
            working_dir,
            output_dir,
            files_to_upload,
            files_to_download,
        }
    }

    /// `s3://bucket/<working dir>` — the blob prefix shared with the
    /// staging side containers.
    pub fn bucket_path(&self) -> String {
        format!("s3://{}{}", self.bucket, self.working_dir)
    }

    /// Remote path of a relative file inside the shared volume. Any
    /// leading separator on `relative` is deduplicated.
    pub fn remote_path(&self, relative: &str) -> String {
        format!("{}/{}", self.working_dir, relative.trim_start_matches('/'))
    }

    /// Blob object key for a relative file (no leading separator).
    pub fn object_key(&self, relative: &str) -> String {
        self.remote_path(relative)
            .trim_start_matches('/')
            .to_owned()
    }

    /// Blob key prefix holding the recursively staged output
    /// directory.
    pub fn output_key_prefix(&self) -> String {
        self.output_dir.trim_start_matches('/').to_owned()
    }

    /// Blob key prefix covering everything the run staged; used for
    /// cleanup listing.
    pub fn working_key_prefix(&self) -> String {
        self.working_dir.trim_start_matches('/').to_owned()
    }
}

/// Upload every input file concurrently.
///
/// Completes only when every transfer has completed; any single
/// failure aborts the run before submission.
pub async fn upload_all(
    blobs: &dyn BlobStore,
    plan: &StagingPlan,
    local_root: &Path,
) -> Result<(), RunnerError> {
    let uploads = plan.files_to_upload.iter().map(|relative| {
        let key = plan.object_key(relative);
        let source = local_root.join(relative.trim_start_matches('/'));
        async move {
            blobs
                .put_object(&plan.bucket, &key, &source)
                .await
                .map_err(|e| RunnerError::Transfer(format!("upload of {relative} failed: {e}")))
        }
    });
    futures::future::try_join_all(uploads).await?;

    if !plan.files_to_upload.is_empty() {
        tracing::debug!(
            count = plan.files_to_upload.len(),
            prefix = %plan.working_key_prefix(),
            "Uploaded input files",
        );
    }
    Ok(())
}

/// Download every requested output file, then mirror the remote output
/// directory, all concurrently.
///
/// Only called after the job reported success; a failure here still
/// fails the run.
pub async fn download_all(
    blobs: &dyn BlobStore,
    plan: &StagingPlan,
    local_working: &Path,
    local_output: &Path,
) -> Result<(), RunnerError> {
    let files = plan.files_to_download.iter().map(|relative| {
        let key = plan.object_key(relative);
        let dest = local_working.join(relative.trim_start_matches('/'));
        async move {
            blobs
                .get_object(&plan.bucket, &key, &dest)
                .await
                .map_err(|e| RunnerError::Transfer(format!("download of {relative} failed: {e}")))
        }
    });
    futures::future::try_join_all(files).await?;

    let prefix = plan.output_key_prefix();
    let keys = blobs.list_keys(&plan.bucket, &prefix).await?;
    let mirrored = keys.iter().map(|key| {
        let relative = key
            .strip_prefix(&prefix)
            .unwrap_or(key)
            .trim_start_matches('/');
        let dest = local_output.join(relative);
        async move {
            blobs
                .get_object(&plan.bucket, key, &dest)
                .await
                .map_err(|e| RunnerError::Transfer(format!("download of {key} failed: {e}")))
        }
    });
    futures::future::try_join_all(mirrored).await?;

    tracing::debug!(
        files = plan.files_to_download.len(),
        mirrored = keys.len(),
        "Downloaded output files",
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_are_unique_per_run() {
        let a = StagingPlan::new("bucket", vec![], vec![]);
        let b = StagingPlan::new("bucket", vec![], vec![]);
        assert_ne!(a.working_dir, b.working_dir);
    }

    #[test]
    fn output_dir_is_under_working_dir() {
        let plan = StagingPlan::new("bucket", vec![], vec![]);
        assert!(plan.output_dir.starts_with(&format!("{}/", plan.working_dir)));
    }

    #[test]
    fn object_key_deduplicates_leading_separator() {
        let plan = StagingPlan::new("bucket", vec![], vec![]);
        let bare = plan.object_key("data/in.csv");
        let slashed = plan.object_key("/data/in.csv");
        assert_eq!(bare, slashed);
        assert!(!bare.starts_with('/'));
        assert!(bare.ends_with("/data/in.csv"));
    }

    #[test]
    fn bucket_path_carries_scheme_and_prefix() {
        let plan = StagingPlan::new("my-bucket", vec![], vec![]);
        let path = plan.bucket_path();
        assert!(path.starts_with("s3://my-bucket/"));
        assert_eq!(path, format!("s3://my-bucket{}", plan.working_dir));
    }

    #[test]
    fn key_prefixes_have_no_leading_separator() {
        let plan = StagingPlan::new("bucket", vec![], vec![]);
        assert!(!plan.working_key_prefix().starts_with('/'));
        assert!(!plan.output_key_prefix().starts_with('/'));
        assert!(plan
            .output_key_prefix()
            .starts_with(&plan.working_key_prefix()));
    }
}
