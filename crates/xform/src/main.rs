mod output;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{debug, info};
use xform_core::arrays::scalar::ScalarValue;
use xform_core::config::session::SessionConfig;
use xform_core::execution::cancel::CancellationToken;
use xform_core::execution::run::run_batches;
use xform_core::query::{BuildContext, parse_query};
use xform_core::storage::provider::LocalFileStreamProvider;
use xform_error::{DbError, Result, ResultExt};

use crate::output::PlainTable;

#[derive(Parser)]
#[clap(name = "xform")]
struct Arguments {
    /// Execute queries from a file, one query per file.
    #[clap(short = 'f', long)]
    files: Vec<PathBuf>,
    /// Query to execute. Verbs may be separated with ';'.
    #[clap(trailing_var_arg = true)]
    query: Vec<String>,
    /// Read table versions as of this time instead of now.
    #[clap(long)]
    as_of: Option<String>,
    /// Rows to pull per batch.
    #[clap(long)]
    batch_size: Option<u64>,
    /// Stop pulling rows after this many milliseconds.
    #[clap(long)]
    timeout_ms: Option<u64>,
    /// Folder holding the tables.
    #[clap(long, env = "XFORM_ROOT", default_value = ".")]
    root: PathBuf,
    /// Log level used when RUST_LOG isn't set.
    #[clap(long, env = "XFORM_LOG", default_value = "error")]
    log: tracing::Level,
}

fn main() {
    let args = Arguments::parse();
    logutil::configure_global_logger(args.log, logutil::LogFormat::HumanReadable, io::stderr);

    if let Err(err) = run(args) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn session_from_args(args: &Arguments) -> Result<SessionConfig> {
    let mut session = SessionConfig::default();
    if let Some(as_of) = &args.as_of {
        session.set_from_scalar("as_of", ScalarValue::from(as_of.as_str()))?;
    }
    if let Some(batch_size) = args.batch_size {
        session.set_from_scalar("batch_size", batch_size.into())?;
    }
    if let Some(timeout) = args.timeout_ms {
        session.set_from_scalar("query_timeout_ms", timeout.into())?;
    }
    Ok(session)
}

fn run(args: Arguments) -> Result<()> {
    let session = session_from_args(&args)?;
    let ctx = BuildContext::new(Arc::new(LocalFileStreamProvider::new(&args.root)), session);

    let mut queries = Vec::new();
    for path in &args.files {
        let text = std::fs::read_to_string(path)
            .map_err(DbError::from)
            .map_err(|e| e.with_field("path", path.display()))?;
        queries.push(text);
    }
    if !args.query.is_empty() {
        queries.push(args.query.join(" "));
    }
    if queries.is_empty() {
        return Err(DbError::usage("No query given, pass a query or a file with -f"));
    }

    let mut stdout = BufWriter::new(io::stdout());
    for query in queries {
        execute(&query, &ctx, &mut stdout)?;
        stdout.flush().context("Failed to flush output")?;
    }

    Ok(())
}

fn execute(query: &str, ctx: &BuildContext, out: &mut impl Write) -> Result<()> {
    let start = Instant::now();
    let mut table = parse_query(query, None, ctx)?;
    debug!(elapsed = ?start.elapsed(), "built query");

    let getters = table
        .columns()
        .iter()
        .map(|c| c.current_getter())
        .collect::<Result<Vec<_>>>()?;

    let mut output = PlainTable::new(table.columns());
    let result = run_batches(
        table.as_mut(),
        ctx.session.batch_size(),
        ctx.session.timeout(),
        &CancellationToken::new(),
        |count| {
            let arrays = getters.iter().map(|g| g.get()).collect::<Result<Vec<_>>>()?;
            output.push_batch(&arrays, count);
            Ok(())
        },
    )?;

    write!(out, "{output}").context("Failed to write output")?;
    if !result.completed {
        writeln!(out, "(stopped after {} rows, timeout reached)", result.rows)
            .context("Failed to write output")?;
    }
    info!(rows = result.rows, elapsed = ?start.elapsed(), completed = result.completed, "query done");

    Ok(())
}
