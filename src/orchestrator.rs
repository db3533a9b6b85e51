//! Posting orchestration
//!
//! One invocation runs the fixed sequence: create the timestamped output
//! directory, split the source, generate PAR2 and SFV artifacts, upload the
//! main parts through the first server that accepts them, upload the
//! artifacts on the same pool, write the NZB, move the artifacts beside it
//! and clean up the temporary part files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::{self, ProgressSink};
use crate::error::{PostError, Result};
use crate::nzb::NzbGenerator;
use crate::par2::Par2Generator;
use crate::paths::unified_output_path;
use crate::pool::NntpPool;
use crate::segments::Segment;
use crate::sfv::SfvGenerator;
use crate::splitter::{FilePart, Splitter};

/// Drives one complete posting run
pub struct Orchestrator {
    config: Config,
}

impl Orchestrator {
    /// Create an orchestrator over a validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Post `file` and return the path of the written NZB
    ///
    /// Fatal at the first unrecoverable step (split, no server accepting the
    /// upload, NZB write). PAR2/SFV generation failures are logged and the
    /// run proceeds without those artifacts; move and cleanup failures after
    /// a successful post are logged and non-fatal since the NZB is
    /// authoritative.
    pub async fn post_file(
        &self,
        file: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<PathBuf> {
        let base_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PostError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "source has no file name",
                ))
            })?
            .to_string();

        let output_dir = unified_output_path(&self.config.output.output_dir, &base_name);
        std::fs::create_dir_all(&output_dir)?;
        info!(dir = %output_dir.display(), "Created output directory");

        // Split
        let splitter = Splitter::new(self.config.posting.max_part_size)?;
        info!(file = %file.display(), "Splitting file");
        let parts = splitter.split_file(file, &output_dir)?;
        info!(
            parts = parts.len(),
            bytes = parts.iter().map(|p| p.len).sum::<u64>(),
            "Split complete"
        );

        // PAR2 (optional)
        let mut par2_files: Vec<PathBuf> = Vec::new();
        if self.config.features.create_par2 {
            info!("Creating PAR2 recovery files");
            let generator = Par2Generator::new(&output_dir, self.config.par2.redundancy);
            match generator.create_for_parts(&parts, &base_name) {
                Ok(Some(set)) => {
                    info!(files = set.files().len(), "PAR2 recovery set created");
                    par2_files = set.files();
                }
                Ok(None) => {}
                Err(e) => error!("Failed to create PAR2 files: {}", e),
            }
        }

        // SFV over parts + PAR2 files (optional)
        let mut sfv_path: Option<PathBuf> = None;
        if self.config.features.create_sfv {
            info!("Creating SFV checksum file");
            let generator = SfvGenerator::new(&output_dir);
            let mut checked: Vec<PathBuf> = parts.iter().map(|p| p.path.clone()).collect();
            checked.extend(par2_files.iter().cloned());
            match generator.create_sfv(&checked, &format!("{}.sfv", base_name)) {
                Ok(path) => sfv_path = Some(path),
                Err(e) => error!("Failed to create SFV file: {}", e),
            }
        }

        // Upload main parts: first server that accepts the batch wins
        let (pool, server_index, main_segments) =
            self.upload_on_first_server(&parts, progress.clone()).await?;
        let server = &self.config.nntp.servers[server_index];
        info!(
            server = %server.host,
            segments = main_segments.len(),
            "Main upload complete"
        );

        // Upload artifacts on the winning pool; failures drop the artifact
        // from the NZB but do not abort the run
        let mut extra_parts: Vec<FilePart> = Vec::new();
        let par2_segments = self
            .upload_artifacts(&pool, server_index, &splitter, &par2_files, &output_dir, &mut extra_parts)
            .await;

        let sfv_segments = match &sfv_path {
            Some(path) => {
                self.upload_artifacts(
                    &pool,
                    server_index,
                    &splitter,
                    std::slice::from_ref(path),
                    &output_dir,
                    &mut extra_parts,
                )
                .await
            }
            None => Vec::new(),
        };

        // Assemble the NZB
        let mut additional = Vec::new();
        if !par2_segments.is_empty() {
            additional.push(("PAR2".to_string(), par2_segments));
        }
        if !sfv_segments.is_empty() {
            additional.push(("SFV".to_string(), sfv_segments));
        }

        let nzb_dir = if self.config.output.nzb_dir.as_os_str().is_empty() {
            output_dir.clone()
        } else {
            self.config.output.nzb_dir.clone()
        };
        info!("Generating NZB file");
        let nzb_generator = NzbGenerator::new(&nzb_dir, self.config.posting.nzb_poster());
        let nzb_path = nzb_generator.generate(
            &base_name,
            main_segments,
            &self.config.posting.group,
            additional,
        )?;

        // Move artifacts next to the NZB, then drop the temporary parts
        let nzb_parent = nzb_path.parent().unwrap_or(&nzb_dir).to_path_buf();
        move_artifacts(&par2_files, &sfv_path, &nzb_parent);

        info!("Cleaning up temporary files");
        splitter.cleanup(&parts);
        splitter.cleanup(&extra_parts);

        pool.close().await;

        info!(nzb = %nzb_path.display(), "Posting completed successfully");
        Ok(nzb_path)
    }

    /// Try servers in order; return the pool and segments of the first that
    /// takes the whole batch
    ///
    /// Each server is probed with a single connect/authenticate/quit round
    /// first, so an unreachable host falls through immediately instead of
    /// stalling in the pool's acquire deadline.
    async fn upload_on_first_server(
        &self,
        parts: &[FilePart],
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(NntpPool, usize, Vec<Segment>)> {
        for (index, server) in self.config.nntp.servers.iter().enumerate() {
            info!(server = %server.host, "Connecting to server");

            if let Err(e) = probe_server(server).await {
                error!(server = %server.host, "Server probe failed: {}", e);
                continue;
            }

            let pool = NntpPool::new(server.clone()).await?;
            match engine::upload_parts(&pool, server, parts, &self.config.posting, progress.clone())
                .await
            {
                Ok(segments) => return Ok((pool, index, segments)),
                Err(e) => {
                    error!(server = %server.host, "Failed to upload parts: {}", e);
                    pool.close().await;
                }
            }
        }
        Err(PostError::AllServersFailed)
    }

    /// Split and upload each artifact file, renumbering the collected
    /// segments densely so one NZB `<file>` entry can hold them all
    async fn upload_artifacts(
        &self,
        pool: &NntpPool,
        server_index: usize,
        splitter: &Splitter,
        files: &[PathBuf],
        output_dir: &Path,
        extra_parts: &mut Vec<FilePart>,
    ) -> Vec<Segment> {
        let server = &self.config.nntp.servers[server_index];
        let mut collected: Vec<Segment> = Vec::new();

        for file in files {
            let file_parts = match splitter.split_file(file, output_dir) {
                Ok(parts) => parts,
                Err(e) => {
                    error!(file = %file.display(), "Failed to split artifact: {}", e);
                    continue;
                }
            };

            match engine::upload_parts(
                pool,
                server,
                &file_parts,
                &self.config.posting,
                Arc::new(engine::NullProgress),
            )
            .await
            {
                Ok(segments) => {
                    // Skip in-place single parts during cleanup; the move
                    // into the NZB directory owns those files
                    extra_parts.extend(
                        file_parts.into_iter().filter(|p| &p.path != file),
                    );
                    collected.extend(segments);
                }
                Err(e) => {
                    error!(file = %file.display(), "Failed to upload artifact: {}", e);
                    splitter.cleanup(
                        &file_parts
                            .into_iter()
                            .filter(|p| &p.path != file)
                            .collect::<Vec<_>>(),
                    );
                }
            }
        }

        renumber(&mut collected);
        collected
    }
}

/// One connect/authenticate/quit round against a server
async fn probe_server(server: &crate::config::ServerConfig) -> Result<()> {
    let mut client = crate::client::NntpClient::connect(Arc::new(server.clone())).await?;
    client.authenticate().await?;
    let _ = client.quit().await;
    Ok(())
}

/// Reassign dense 1..N ordinals across segments collected from several
/// re-split artifact files (each arrives numbered from 1)
fn renumber(segments: &mut [Segment]) {
    let total = segments.len() as u32;
    for (i, segment) in segments.iter_mut().enumerate() {
        segment.number = i as u32 + 1;
        segment.total = total;
    }
}

/// Best-effort rename of PAR2/SFV files into the NZB directory
fn move_artifacts(par2_files: &[PathBuf], sfv_path: &Option<PathBuf>, dest: &Path) {
    let mut moved = 0usize;
    for file in par2_files.iter().chain(sfv_path.iter()) {
        if !file.exists() {
            continue;
        }
        if file.parent() == Some(dest) {
            continue;
        }
        let Some(name) = file.file_name() else { continue };
        let target = dest.join(name);
        match std::fs::rename(file, &target) {
            Ok(()) => moved += 1,
            Err(e) => warn!(file = %file.display(), "Failed to move artifact: {}", e),
        }
    }
    if moved > 0 {
        info!(moved, dest = %dest.display(), "Moved recovery artifacts to NZB directory");
    }
}
