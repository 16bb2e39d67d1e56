// src/readers/accesspolicy.rs

//! Which files a [`Log`] may open.
//!
//! [`Log`]: crate::readers::log::Log

use crate::common::Path;

use std::fmt;
use std::path::PathBuf;

/// Decides whether a file may be read. Consulted once per snapshot open.
pub trait AccessPolicy: Send + Sync + fmt::Debug {
    /// `None` if `path` may be read, otherwise a message for the user.
    ///
    /// `path` is absolute.
    fn check_access(
        &self,
        path: &Path,
    ) -> Option<String>;
}

/// Every file may be read.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check_access(
        &self,
        _path: &Path,
    ) -> Option<String> {
        None
    }
}

/// Files under one of a set of directories may be read.
#[derive(Clone, Debug, Default)]
pub struct RootsAccessPolicy {
    roots: Vec<PathBuf>,
}

impl RootsAccessPolicy {
    pub fn new<I, P>(roots: I) -> RootsAccessPolicy
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        RootsAccessPolicy {
            roots: roots
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl AccessPolicy for RootsAccessPolicy {
    fn check_access(
        &self,
        path: &Path,
    ) -> Option<String> {
        if self
            .roots
            .iter()
            .any(|root| path.starts_with(root))
        {
            return None;
        }
        let roots: Vec<String> = self
            .roots
            .iter()
            .map(|root| root.display().to_string())
            .collect();

        Some(format!(
            "You cannot open \"{}\", the file must be located in: [{}]",
            path.display(),
            roots.join(", ")
        ))
    }
}
