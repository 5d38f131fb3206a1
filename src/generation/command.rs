use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::atomic::{AtomicU64, Ordering},
};

use futures::{future::BoxFuture, FutureExt};
use log::{debug, info, warn};

use super::{Capabilities, GenerationError, GenerationProvider, GenerationRequest};
use crate::image_utils::mime_extension;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CommandProviderConfig {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub capabilities: Capabilities,
}

impl Default for CommandProviderConfig {
    fn default() -> Self {
        Self {
            name: "caricature-generate".into(),
            program: "caricature-generate".into(),
            args: Vec::new(),
            capabilities: Capabilities {
                accepts_input_image: true,
                preserves_framing: true,
            },
        }
    }
}

/// Delegates generation to an external program.
///
/// The input image is written to stdin. Style, prompt, MIME and the paths
/// of the reference images are passed as `CARICATURE_*` environment
/// variables. The program prints the encoded result to stdout and reports
/// failures on stderr with a non-zero exit code.
pub struct CommandProvider {
    config: CommandProviderConfig,
}

impl CommandProvider {
    pub fn new(config: CommandProviderConfig) -> Self {
        Self { config }
    }

    fn run_blocking(config: &CommandProviderConfig, request: &GenerationRequest) -> Result<Vec<u8>, GenerationError> {
        let references = ReferenceFiles::write(request).map_err(|e| {
            warn!("Could not stage reference images: {e}");
            GenerationError::ServiceUnavailable
        })?;
        let input = request
            .image
            .as_ref()
            .filter(|_| config.capabilities.accepts_input_image);

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .env("CARICATURE_STYLE", request.style.label())
            .env("CARICATURE_PROMPT", request.prompt())
            .env("CARICATURE_QUALITY", request.quality.label())
            .env("CARICATURE_MIME", input.map(|i| i.mime.as_str()).unwrap_or(""))
            .env("CARICATURE_REFERENCES", references.joined())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            warn!("Could not start {}: {e}", config.program.display());
            GenerationError::ServiceUnavailable
        })?;

        let stdin = child.stdin.take();
        let bytes = input.map(|i| i.bytes.clone());
        let writer = std::thread::spawn(move || -> io::Result<()> {
            if let (Some(mut stdin), Some(bytes)) = (stdin, bytes) {
                stdin.write_all(&bytes)?;
            }
            Ok(())
        });

        let output = child.wait_with_output().map_err(|e| {
            warn!("{} did not finish: {e}", config.program.display());
            GenerationError::ServiceUnavailable
        })?;
        match writer.join() {
            Ok(Err(e)) => debug!("Input pipe closed early: {e}"),
            Err(_) => warn!("Input writer panicked"),
            Ok(Ok(())) => {}
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            info!("{} exited with {}: {}", config.name, output.status, stderr.trim());
            return Err(classify_failure(&stderr));
        }
        if output.stdout.is_empty() {
            return Err(GenerationError::MalformedResponse("empty output".into()));
        }
        Ok(output.stdout)
    }
}

impl GenerationProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> Capabilities {
        self.config.capabilities
    }

    fn generate(&self, request: GenerationRequest) -> BoxFuture<'static, Result<Vec<u8>, GenerationError>> {
        let (tx, rx) = futures::channel::oneshot::channel();
        let config = self.config.clone();
        std::thread::spawn(move || {
            let _ = tx.send(Self::run_blocking(&config, &request));
        });
        async move { rx.await.unwrap_or(Err(GenerationError::ServiceUnavailable)) }.boxed()
    }
}

/// Maps a provider's error text onto a failure category.
pub fn classify_failure(message: &str) -> GenerationError {
    let lower = message.to_ascii_lowercase();
    let has = |needles: &[&'static str]| needles.iter().any(|n| lower.contains(n));
    if has(&["429", "quota", "resource_exhausted", "rate limit"]) {
        GenerationError::RateLimited {
            retry_after: None,
        }
    } else if has(&["401", "403", "api key", "unauthorized", "permission"]) {
        GenerationError::Auth
    } else if has(&["safety", "blocked", "harm"]) {
        GenerationError::ContentBlocked
    } else if has(&["503", "overloaded", "unavailable"]) {
        GenerationError::ServiceUnavailable
    } else {
        let detail: String = message.trim().chars().take(120).collect();
        GenerationError::MalformedResponse(detail)
    }
}

static NEXT_STAGING_DIR: AtomicU64 = AtomicU64::new(0);

/// Reference images written to a temporary directory for one invocation.
struct ReferenceFiles {
    dir: Option<PathBuf>,
    paths: Vec<PathBuf>,
}

impl ReferenceFiles {
    fn write(request: &GenerationRequest) -> io::Result<Self> {
        if request.references.is_empty() {
            return Ok(Self {
                dir: None,
                paths: Vec::new(),
            });
        }
        let dir = std::env::temp_dir().join(format!(
            "caricature-refs-{}-{}",
            std::process::id(),
            NEXT_STAGING_DIR.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir)?;
        let mut files = Self {
            dir: Some(dir.clone()),
            paths: Vec::new(),
        };
        for (i, reference) in request.references.iter().enumerate() {
            let path = dir.join(format!("reference-{i}.{}", mime_extension(&reference.mime)));
            std::fs::write(&path, &reference.bytes)?;
            files.paths.push(path);
        }
        Ok(files)
    }

    fn joined(&self) -> std::ffi::OsString {
        std::env::join_paths(self.paths.iter().map(PathBuf::as_path)).unwrap_or_default()
    }
}

impl Drop for ReferenceFiles {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.as_deref() {
            remove_staging(dir);
        }
    }
}

fn remove_staging(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        debug!("Could not remove {}: {e}", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::generation::EncodedImage;

    fn request(image: Option<EncodedImage>) -> GenerationRequest {
        GenerationRequest {
            image,
            style: Default::default(),
            quality: Default::default(),
            instructions: String::new(),
            references: vec![],
        }
    }

    fn shell(script: &str) -> CommandProvider {
        CommandProvider::new(CommandProviderConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            ..Default::default()
        })
    }

    #[test]
    fn stderr_is_classified() {
        assert_eq!(
            GenerationError::RateLimited { retry_after: None },
            classify_failure("HTTP 429 RESOURCE_EXHAUSTED")
        );
        assert_eq!(GenerationError::Auth, classify_failure("API key not valid"));
        assert_eq!(
            GenerationError::ContentBlocked,
            classify_failure("finishReason: SAFETY")
        );
        assert_eq!(
            GenerationError::ContentBlocked,
            classify_failure("rejected: HARM_CATEGORY_DANGEROUS_CONTENT")
        );
        assert_eq!(
            GenerationError::ServiceUnavailable,
            classify_failure("503 The model is overloaded")
        );
        assert!(matches!(
            classify_failure("segfault"),
            GenerationError::MalformedResponse(m) if m == "segfault"
        ));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let provider = CommandProvider::new(CommandProviderConfig {
            program: "/nonexistent/caricature-generate".into(),
            ..Default::default()
        });
        let result = block_on(provider.generate(request(None)));
        assert_eq!(Err(GenerationError::ServiceUnavailable), result);
    }

    #[cfg(unix)]
    #[test]
    fn stdout_of_program_is_the_result() {
        let input = EncodedImage::new(vec![7u8, 8, 9], "image/png");
        let result = block_on(shell("cat").generate(request(Some(input))));
        assert_eq!(Ok(vec![7, 8, 9]), result);
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_is_classified() {
        let result = block_on(shell("echo 'quota exceeded' >&2; exit 3").generate(request(None)));
        assert_eq!(Err(GenerationError::RateLimited { retry_after: None }), result);
    }

    #[cfg(unix)]
    #[test]
    fn silent_program_is_malformed() {
        let result = block_on(shell("exit 0").generate(request(None)));
        assert!(matches!(result, Err(GenerationError::MalformedResponse(_))));
    }
}
