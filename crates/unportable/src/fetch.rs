//! `request_urls`: fetch a batch of URLs concurrently.
//!
//! One scoped thread per URL, all started before any is joined. Each task owns
//! its outcome until the join, and handles are joined in input order, so slot
//! `i` of the result always belongs to URL `i` no matter which finished first.
//! A failed task leaves `nil` in its slot; it never fails the batch.

use std::io::Read as _;
use std::time::Duration;

use anyhow::Context as _;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use tracing::{debug, warn};
use unportable_contracts::{
    ARG_FLAGS, ARG_TIMEOUT, ARG_TMP_PATH, ARG_URLS, OP_REQUEST_URLS, REQUEST_FLAG_ACCEPT_XML,
    REQUEST_FLAG_UNCOMPRESS, REQUEST_USER_AGENT,
};

use crate::args::{ArgDecl, Params};
use crate::dispatch::{Context, Operation, Reply};
use crate::error::{ensure, OpResult};
use crate::lua::Value;

const ACCEPT_XML: &str = "application/xml";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchFlags(i64);

impl FetchFlags {
    pub const fn from_bits(bits: i64) -> Self {
        FetchFlags(bits)
    }

    pub fn bits(self) -> i64 {
        self.0
    }

    /// Decode a gzip/deflate body according to `Content-Encoding`.
    pub fn uncompress(self) -> bool {
        (self.0 & REQUEST_FLAG_UNCOMPRESS) != 0
    }

    /// Send `Accept: application/xml`.
    pub fn accept_xml(self) -> bool {
        (self.0 & REQUEST_FLAG_ACCEPT_XML) != 0
    }
}

/// Transport seam for `request_urls`.
pub trait Fetcher: Sync {
    fn fetch(
        &self,
        url: &str,
        timeout: Option<Duration>,
        flags: FetchFlags,
    ) -> anyhow::Result<Vec<u8>>;
}

/// HTTP(S) over a shared ureq agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        timeout: Option<Duration>,
        flags: FetchFlags,
    ) -> anyhow::Result<Vec<u8>> {
        let mut req = self.agent.get(url).header("User-Agent", REQUEST_USER_AGENT);
        if flags.accept_xml() {
            req = req.header("Accept", ACCEPT_XML);
        }
        let resp = req
            .config()
            .timeout_global(timeout)
            .build()
            .call()
            .with_context(|| format!("GET {url}"))?;

        let encoding = resp
            .headers()
            .get("content-encoding")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .with_context(|| format!("read response body: {url}"))?;

        if flags.uncompress() {
            body = decode_body(encoding.as_deref(), body)
                .with_context(|| format!("decompress response body: {url}"))?;
        }
        Ok(body)
    }
}

/// Undoes `Content-Encoding`. Unknown or missing encodings pass through.
pub fn decode_body(encoding: Option<&str>, body: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    match encoding {
        Some("gzip") => {
            MultiGzDecoder::new(body.as_slice())
                .read_to_end(&mut out)
                .context("gunzip")?;
        }
        Some("deflate") => {
            ZlibDecoder::new(body.as_slice())
                .read_to_end(&mut out)
                .context("inflate")?;
        }
        _ => return Ok(body),
    }
    Ok(out)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTask {
    pub index: usize,
    pub url: String,
    pub timeout: Option<Duration>,
    pub flags: FetchFlags,
}

/// Pacing for task starts: task `i` waits `(i / batch) * delay`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stagger {
    pub delay: Duration,
    pub batch: usize,
}

impl Stagger {
    fn delay_for(self, index: usize) -> Duration {
        let step = index / self.batch.max(1);
        self.delay.saturating_mul(u32::try_from(step).unwrap_or(u32::MAX))
    }
}

/// Runs every task and returns one outcome per task, in task order.
pub fn fetch_all(
    fetcher: &dyn Fetcher,
    tasks: &[FetchTask],
    stagger: Option<Stagger>,
) -> Vec<Option<Vec<u8>>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = tasks
            .iter()
            .map(|task| {
                let delay = stagger.map(|s| s.delay_for(task.index));
                std::thread::Builder::new()
                    .name(format!("fetch-{}", task.index))
                    .spawn_scoped(scope, move || {
                        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
                            std::thread::sleep(delay);
                        }
                        fetcher.fetch(&task.url, task.timeout, task.flags)
                    })
            })
            .collect();

        handles
            .into_iter()
            .zip(tasks)
            .map(|(handle, task)| {
                let outcome = match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("fetch task panicked"))),
                    Err(err) => Err(anyhow::Error::new(err).context("spawn fetch task")),
                };
                match outcome {
                    Ok(body) => {
                        debug!(
                            index = task.index,
                            url = %task.url,
                            flags = task.flags.bits(),
                            bytes = body.len(),
                            "fetched"
                        );
                        Some(body)
                    }
                    Err(err) => {
                        warn!(index = task.index, url = %task.url, "fetch failed: {err:#}");
                        None
                    }
                }
            })
            .collect()
    })
}

const DECLS: &[ArgDecl] = &[
    ArgDecl::str_tuple(ARG_URLS),
    ArgDecl::int(ARG_TIMEOUT),
    ArgDecl::int_tuple(ARG_FLAGS),
    ArgDecl::str(ARG_TMP_PATH),
];

pub fn operation() -> Operation {
    Operation {
        name: OP_REQUEST_URLS,
        decls: DECLS,
        handler: request_urls,
    }
}

fn request_urls(p: &Params<'_>, ctx: &Context<'_>) -> OpResult<Option<Reply>> {
    let urls = p.str_tuple(ARG_URLS).unwrap_or(&[]);
    let flags = p.int_tuple(ARG_FLAGS).unwrap_or(&[]);
    ensure(urls.len() == flags.len(), || {
        format!(
            "{ARG_URLS} and {ARG_FLAGS} differ in length ({} vs {})",
            urls.len(),
            flags.len()
        )
    })?;
    let tmp_path = p.str(ARG_TMP_PATH).filter(|s| !s.is_empty());
    ensure(tmp_path.is_some(), || format!("{ARG_TMP_PATH} is required"))?;

    let timeout = match p.int(ARG_TIMEOUT) {
        Some(secs) if secs > 0 => Some(Duration::from_secs(secs.unsigned_abs())),
        _ => ctx.config.fetch_timeout,
    };
    let tasks: Vec<FetchTask> = urls
        .iter()
        .zip(flags)
        .enumerate()
        .map(|(index, (url, &bits))| FetchTask {
            index,
            url: url.clone(),
            timeout,
            flags: FetchFlags::from_bits(bits),
        })
        .collect();
    let stagger = ctx.config.fetch_stagger.map(|delay| Stagger {
        delay,
        batch: ctx.config.fetch_stagger_batch,
    });

    let results = fetch_all(ctx.fetcher, &tasks, stagger);
    let value = Value::Tuple(results.into_iter().map(Value::from).collect());
    Ok(Some(Reply::new(value).spill_to(tmp_path)))
}
