use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    file_matches, DownloadRequest, Downloader, LookasideEndpoint, LookasideError, PathTemplate,
    Prober,
};

/// How the layout used for a download was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// A candidate answered `HEAD` with 200
    Resolved,
    /// No candidate answered 200; the endpoint default was used
    Inconclusive,
    /// The destination already held the expected content, nothing was probed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownload {
    pub destination: PathBuf,
    pub url: String,
    pub template: PathTemplate,
    pub probe: ProbeOutcome,
}

/// Finds the layout a lookaside server uses and downloads through it.
///
/// Holds no per-request state; the chosen template flows from [`probe`](Self::probe) to
/// the fetch as a value, so one resolver can serve concurrent callers.
pub struct LookasideResolver {
    endpoint: LookasideEndpoint,
    prober: Arc<dyn Prober>,
    downloader: Arc<dyn Downloader>,
}

impl LookasideResolver {
    pub fn new(
        endpoint: LookasideEndpoint,
        prober: Arc<dyn Prober>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            endpoint,
            prober,
            downloader,
        }
    }

    pub fn endpoint(&self) -> &LookasideEndpoint {
        &self.endpoint
    }

    /// Probes every layout in order and returns the first that answers 200.
    ///
    /// Probe failures are not errors; when nothing answers, the endpoint default is returned
    /// together with [`ProbeOutcome::Inconclusive`].
    pub fn probe(&self, request: &DownloadRequest) -> (PathTemplate, ProbeOutcome) {
        for template in self.endpoint.templates() {
            let url = self.endpoint.url_for(template, request);
            match self.prober.head_status(&url) {
                Ok(200) => {
                    debug!(%url, %template, "Lookaside layout resolved");
                    return (template, ProbeOutcome::Resolved);
                }
                Ok(status) => debug!(%url, status, "Probe did not match"),
                Err(e) => debug!(%url, error = %e, "Probe failed"),
            }
        }

        let template = self.endpoint.default_template;
        warn!(
            file = %request.filename,
            default = %template,
            "Lookaside probe inconclusive, using default layout"
        );
        (template, ProbeOutcome::Inconclusive)
    }

    pub fn resolve_and_download(
        &self,
        request: &DownloadRequest,
    ) -> Result<ResolvedDownload, LookasideError> {
        if file_matches(&request.destination, request.hash_algorithm, &request.hash) {
            debug!(
                destination = %request.destination.display(),
                "Already downloaded, skipping"
            );
            let template = self.endpoint.default_template;
            return Ok(ResolvedDownload {
                destination: request.destination.clone(),
                url: self.endpoint.url_for(template, request),
                template,
                probe: ProbeOutcome::Skipped,
            });
        }

        let (template, probe) = self.probe(request);
        let url = self.endpoint.url_for(template, request);

        info!(file = %request.filename, %url, "Downloading");
        self.downloader.fetch(&url, request)?;

        Ok(ResolvedDownload {
            destination: request.destination.clone(),
            url,
            template,
            probe,
        })
    }
}
