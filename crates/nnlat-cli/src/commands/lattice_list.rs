//! Lattice path collection and job splitting for batch decoding.

use std::io::{self, BufRead};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("invalid number of jobs: {0}")]
    InvalidNumJobs(usize),
    #[error("invalid job {job} (must be below {num_jobs})")]
    InvalidJob { job: usize, num_jobs: usize },
}

/// Paths given on the command line followed by those in a list file, with
/// surrounding whitespace removed and blank entries dropped.
pub fn collect_paths<R: BufRead>(paths: &[String], list: Option<R>) -> io::Result<Vec<String>> {
    let mut all: Vec<String> = paths.to_vec();
    if let Some(list) = list {
        for line in list.lines() {
            all.push(line?);
        }
    }
    Ok(all
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

/// Every `num_jobs`-th item starting at index `job`.
pub fn select_job<T>(items: Vec<T>, num_jobs: usize, job: usize) -> Result<Vec<T>, JobError> {
    if num_jobs < 1 {
        return Err(JobError::InvalidNumJobs(num_jobs));
    }
    if job >= num_jobs {
        return Err(JobError::InvalidJob { job, num_jobs });
    }
    Ok(items.into_iter().skip(job).step_by(num_jobs).collect())
}
