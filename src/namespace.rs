//! Lookaside namespace derivation
//!
//! Artifacts are stored on the cache under the package's dist-git module path
//! (`rpms/hello`), which is recovered from the push URL of the working copy by matching it
//! against the configured clone URL templates.

use regex::Regex;
use std::path::Path;
use tracing::debug;

use crate::process::{CommandRunner, Invocation};

const USER_PLACEHOLDER: &str = "%(user)s";
const MODULE_PLACEHOLDER: &str = "%(module)s";

/// Turns a clone URL template into an anchored regex capturing the module path
fn template_regex(template: &str, user: Option<&str>) -> Option<Regex> {
    if !template.contains(MODULE_PLACEHOLDER) {
        return None;
    }

    let user_pattern = match user {
        Some(user) => regex::escape(user),
        None => "[^/@]+".to_string(),
    };

    let mut pattern = String::from("^");
    for (i, piece) in template.split(MODULE_PLACEHOLDER).enumerate() {
        if i > 0 {
            pattern.push_str("(.+?)/?");
        }
        let literal: Vec<String> = piece.split(USER_PLACEHOLDER).map(regex::escape).collect();
        pattern.push_str(&literal.join(user_pattern.as_str()));
    }
    pattern.push('$');

    Regex::new(&pattern).ok()
}

/// Matches `url` against each template in turn and returns the module path of the first hit,
/// without a trailing `.git`.
pub fn module_from_url(url: &str, templates: &[&str], user: Option<&str>) -> Option<String> {
    let url = url.trim();
    templates
        .iter()
        .filter(|template| !template.is_empty())
        .filter_map(|template| template_regex(template, user))
        .find_map(|re| {
            re.captures(url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .map(|module| {
            module
                .strip_suffix(".git")
                .map(str::to_string)
                .unwrap_or(module)
        })
        .filter(|module| !module.is_empty())
}

/// Push URL of the `origin` remote, or `None` when `dir` is not a git checkout
pub fn git_push_url(runner: &dyn CommandRunner, dir: &Path) -> Option<String> {
    let invocation = Invocation::new("git")
        .args(["remote", "get-url", "--push", "origin"])
        .current_dir(dir);

    match runner.run(&invocation) {
        Ok(output) if output.success() => {
            let url = output.stdout.trim();
            (!url.is_empty()).then(|| url.to_string())
        }
        Ok(output) => {
            debug!(stderr = %output.stderr.trim(), "No git push URL");
            None
        }
        Err(e) => {
            debug!(error = %e, "git is not available");
            None
        }
    }
}
