mod error;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use error::{CliError, CliResult};
use sm_config::SessionConfig;
use sm_core::{
    ConnectOptions, InstanceId, MapMode, ScalarType, SignalPath, SignalValue, Timetag,
};
use sm_device::{Device, RetryPolicy, SignalProps, SignalSpec, poll_until};
use sm_expr::{Expression, Signature};
use sm_monitor::Monitor;
use sm_session::Session;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sm-cli")]
#[command(about = "sigmap CLI - device-to-device signal mapping", long_about = None)]
struct Cli {
    /// Log protocol steps (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the two-device queue scenario and print every delivery
    Demo {
        /// Number of queued updates to send
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Connection mode (linear, bypass, expression, calibrate)
        #[arg(long, default_value = "linear")]
        mode: MapMode,
        /// Expression for expression mode
        #[arg(long)]
        expression: Option<String>,
        /// Session configuration file (YAML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Evaluate an expression over a sequence of inputs
    Eval {
        /// Expression, e.g. "y=x*2+y{-1}"
        expression: String,
        /// Input sample; vectors are comma separated ("1,2,3")
        #[arg(long = "input", required = true)]
        inputs: Vec<String>,
        /// Source type (i, f, d)
        #[arg(long, default_value = "d")]
        src_type: ScalarType,
        /// Destination type (i, f, d)
        #[arg(long, default_value = "d")]
        dst_type: ScalarType,
        /// Destination length (defaults to the input length)
        #[arg(long)]
        dst_length: Option<usize>,
    },
    /// Load and validate a session configuration file
    CheckConfig {
        /// Path to the configuration file
        path: PathBuf,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Demo {
            count,
            mode,
            expression,
            config,
        } => cmd_demo(count, mode, expression, config.as_deref()),
        Commands::Eval {
            expression,
            inputs,
            src_type,
            dst_type,
            dst_length,
        } => cmd_eval(&expression, &inputs, src_type, dst_type, dst_length),
        Commands::CheckConfig { path } => cmd_check_config(&path),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_demo(
    count: u32,
    mode: MapMode,
    expression: Option<String>,
    config: Option<&Path>,
) -> CliResult<()> {
    let config = match config {
        Some(path) => sm_config::load(path)?,
        None => SessionConfig::default(),
    };
    let retry = RetryPolicy::from_config(&config);
    let session = Session::with_config(config);
    let mut monitor = Monitor::new(&session);

    let mut src = Device::new(&session, "src")?;
    let outs = [
        src.add_output(SignalSpec::scalar("outsig1", ScalarType::Int32).with_range(0.0, 1000.0))?,
        src.add_output(SignalSpec::scalar("outsig2", ScalarType::Int32).with_range(0.0, 1000.0))?,
    ];

    let mut dst = Device::new(&session, "dest")?;
    for name in ["insig1", "insig2"] {
        dst.add_input_with_handler(
            SignalSpec::scalar(name, ScalarType::Float32).with_range(0.0, 1.0),
            |props: &SignalProps, instance: InstanceId, value: &SignalValue, t: Timetag| {
                println!("handler: {} [{instance}] = {value} at {t}", props.name);
            },
        )?;
    }

    if !poll_until(&mut [&mut src, &mut dst], retry, |d| {
        d.iter().all(|d| d.ready())
    }) {
        return Err(CliError::Timeout("devices to become ready"));
    }
    info!("devices ready");

    monitor.link("src", "dest")?;
    if !poll_until(&mut [&mut src, &mut dst], retry, |d| d[0].num_links_out() == 1) {
        return Err(CliError::Timeout("link"));
    }

    let mut options = ConnectOptions::new().with_mode(mode);
    if let Some(expression) = expression {
        options = options.with_expression(expression);
    }
    for (out, input) in [("outsig1", "insig1"), ("outsig2", "insig2")] {
        monitor.connect(
            &SignalPath::new("src", out),
            &SignalPath::new("dest", input),
            options.clone(),
        )?;
    }
    if !poll_until(&mut [&mut src, &mut dst], retry, |d| {
        d[0].num_connections_out() == 2
    }) {
        return Err(CliError::Timeout("connections"));
    }
    monitor.poll(0);
    for props in monitor.connections() {
        println!(
            "connected {} -> {} ({}{})",
            props.src,
            props.dst,
            props.mode,
            props
                .expression
                .as_deref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default()
        );
    }

    let span = count.max(1) as i64;
    for i in 0..count {
        let t = src.now();
        src.start_queue(t)?;
        let up = (i as i64 * 1000 / span) as i32;
        src.signal_mut(outs[0])?.update(up)?;
        src.signal_mut(outs[1])?.update(1000 - up)?;
        src.send_queue(t)?;
        debug!(%t, up, "sent queue");
        dst.poll(retry.poll_timeout_ms);
    }
    dst.poll(0);
    Ok(())
}

fn parse_sample(text: &str, ty: ScalarType) -> CliResult<Vec<f64>> {
    let values = text
        .split(',')
        .map(|item| {
            item.trim()
                .parse::<f64>()
                .map_err(|e| CliError::InvalidArgument(format!("'{item}': {e}")))
        })
        .collect::<CliResult<Vec<f64>>>()?;
    Ok(SignalValue::from_f64s(ty, &values).to_f64s())
}

fn cmd_eval(
    expression: &str,
    inputs: &[String],
    src_type: ScalarType,
    dst_type: ScalarType,
    dst_length: Option<usize>,
) -> CliResult<()> {
    let samples = inputs
        .iter()
        .map(|text| parse_sample(text, src_type))
        .collect::<CliResult<Vec<_>>>()?;
    let src_length = samples.first().map(Vec::len).unwrap_or(1);
    if let Some(bad) = samples.iter().find(|s| s.len() != src_length) {
        return Err(CliError::InvalidArgument(format!(
            "all inputs must have {src_length} elements, got {}",
            bad.len()
        )));
    }

    let expr = Expression::parse(
        expression,
        Signature {
            src_type,
            src_length,
            dst_type,
            dst_length: dst_length.unwrap_or(src_length),
        },
    )?;
    debug!(
        input_history = expr.input_history_size(),
        output_history = expr.output_history_size(),
        "parsed expression"
    );

    let (mut input, mut output) = expr.new_histories();
    for sample in samples {
        let x = SignalValue::from_f64s(src_type, &sample);
        input.push(sample);
        let y = expr.evaluate(&input, &mut output)?;
        println!("{x} -> {}", SignalValue::from_f64s(dst_type, &y));
    }
    Ok(())
}

fn cmd_check_config(path: &Path) -> CliResult<()> {
    println!("Checking configuration: {}", path.display());
    let config = sm_config::load(path)?;
    println!("✓ Configuration is valid");
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
