//! handframe CLI - replay recorded hand landmarks into training data
//!
//! Commands:
//! - capture: Build a labeled capture payload from recorded landmark events
//! - windows: Emit classify-mode sliding windows as NDJSON
//! - validate: Validate landmark event schema
//! - doctor: Check configuration files and environment
//! - schema: Print input/output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use handframe::config::{CaptureSessionConfig, UploadConfig};
use handframe::pipeline::{capture_events, sliding_windows};
use handframe::schema::{LandmarkEvent, LandmarkEventAdapter, SCHEMA_VERSION};
use handframe::types::NormalizationMode;
use handframe::upload::{deliver, DeliveryReceipt, HttpUploader, JsonFileStore, SessionSink};
use handframe::{ComputeError, HANDFRAME_VERSION};

/// handframe - hand landmark frame pipeline
#[derive(Parser)]
#[command(name = "handframe")]
#[command(version = HANDFRAME_VERSION)]
#[command(about = "Turn hand landmark streams into fixed-shape training samples", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a labeled capture payload from recorded landmark events
    Capture {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Write the payload JSON here (use - for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Session configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Label to record (overrides the config file)
        #[arg(long)]
        label: Option<String>,

        /// Number of dataframes to collect (overrides the config file)
        #[arg(long)]
        target: Option<usize>,

        /// Normalization mode (overrides the config file)
        #[arg(long)]
        mode: Option<ModeArg>,

        /// Upload configuration file (JSON)
        #[arg(long)]
        upload_config: Option<PathBuf>,

        /// POST the payload to the collection server
        #[arg(long)]
        upload: bool,

        /// Also store the payload as a JSON file in this directory
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Accept a session that ran out of input before reaching its target
        #[arg(long)]
        allow_partial: bool,
    },

    /// Emit classify-mode sliding windows as NDJSON
    Windows {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Session configuration file (JSON); only layout fields are used
        #[arg(long)]
        config: Option<PathBuf>,

        /// Frames per window (overrides the config file)
        #[arg(long)]
        dataframe_size: Option<usize>,

        /// Normalization mode (overrides the config file)
        #[arg(long)]
        mode: Option<ModeArg>,
    },

    /// Validate landmark event schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Required number of landmarks per event
        #[arg(long)]
        landmarks: Option<usize>,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration files and environment
    Doctor {
        /// Session configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Upload configuration file to check
        #[arg(long)]
        upload_config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Pass coordinates through
    Default,
    /// Rescale relative to the hand's bounding box
    ScaleAndTranslate,
}

impl From<ModeArg> for NormalizationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Default => NormalizationMode::Default,
            ModeArg::ScaleAndTranslate => NormalizationMode::ScaleAndTranslate,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (hand.landmarks.v1)
    Input,
    /// Output schema (capture payload)
    Output,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), HandframeCliError> {
    match cli.command {
        Commands::Capture {
            input,
            output,
            input_format,
            config,
            label,
            target,
            mode,
            upload_config,
            upload,
            store_dir,
            allow_partial,
        } => cmd_capture(CaptureArgs {
            input,
            output,
            input_format,
            config,
            label,
            target,
            mode,
            upload_config,
            upload,
            store_dir,
            allow_partial,
        }),

        Commands::Windows {
            input,
            output,
            input_format,
            config,
            dataframe_size,
            mode,
        } => cmd_windows(&input, &output, input_format, config.as_deref(), dataframe_size, mode),

        Commands::Validate {
            input,
            input_format,
            landmarks,
            json,
        } => cmd_validate(&input, input_format, landmarks, json),

        Commands::Doctor {
            config,
            upload_config,
            json,
        } => cmd_doctor(config.as_deref(), upload_config.as_deref(), json),

        Commands::Schema { schema_type, json_schema } => cmd_schema(schema_type, json_schema),
    }
}

struct CaptureArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    input_format: InputFormat,
    config: Option<PathBuf>,
    label: Option<String>,
    target: Option<usize>,
    mode: Option<ModeArg>,
    upload_config: Option<PathBuf>,
    upload: bool,
    store_dir: Option<PathBuf>,
    allow_partial: bool,
}

fn cmd_capture(args: CaptureArgs) -> Result<(), HandframeCliError> {
    let events = read_events(&args.input, &args.input_format)?;
    if events.is_empty() {
        return Err(HandframeCliError::NoEvents);
    }
    for event in &events {
        event.validate(None)?;
    }

    let mut config = match &args.config {
        Some(path) => CaptureSessionConfig::from_json(&fs::read_to_string(path)?)?,
        None => {
            let label = args.label.clone().ok_or(HandframeCliError::MissingLabel)?;
            CaptureSessionConfig::new(label, args.target.unwrap_or(1))
        }
    };
    if let Some(label) = args.label {
        config.label = label;
    }
    if let Some(target) = args.target {
        config.target_sample_count = target;
    }
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }

    let target = config.target_sample_count;
    let session = capture_events(&events, config)?;
    let progress = session.progress();

    if !progress.is_complete && !args.allow_partial {
        return Err(HandframeCliError::Incomplete {
            collected: progress.dataframe_count,
            target,
        });
    }

    let started_at = session.started_at();
    let session_id = session.id();
    let payload = session.into_payload();

    if let Some(output) = &args.output {
        write_output(output, &payload.to_json()?)?;
    }

    let mut receipts = Vec::new();

    if let Some(dir) = &args.store_dir {
        receipts.push(JsonFileStore::new(dir).deliver(&payload)?);
    }

    if args.upload || args.upload_config.is_some() {
        let mut upload_config = match &args.upload_config {
            Some(path) => UploadConfig::from_json(&fs::read_to_string(path)?)?,
            None => UploadConfig::default(),
        };
        if args.upload {
            upload_config.should_upload = true;
        }
        let uploader = HttpUploader::new(&upload_config)?;
        receipts.push(deliver(&payload, &upload_config, &uploader)?);
    }

    let report = CaptureReport {
        session_id: session_id.to_string(),
        label: payload.label.clone(),
        started_at: started_at.to_rfc3339(),
        events: events.len(),
        dataframes: progress.dataframe_count,
        target,
        complete: progress.is_complete,
        deliveries: receipts,
    };
    eprintln!("{}", serde_json::to_string(&report)?);

    Ok(())
}

fn cmd_windows(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    config: Option<&Path>,
    dataframe_size: Option<usize>,
    mode: Option<ModeArg>,
) -> Result<(), HandframeCliError> {
    let events = read_events(input, &input_format)?;
    if events.is_empty() {
        return Err(HandframeCliError::NoEvents);
    }

    let mut config = match config {
        Some(path) => CaptureSessionConfig::from_json(&fs::read_to_string(path)?)?,
        None => CaptureSessionConfig::new("", 0),
    };
    if let Some(size) = dataframe_size {
        config.dataframe_size = size;
    }
    if let Some(mode) = mode {
        config.mode = mode.into();
    }

    let windows = sliding_windows(&events, &config)?;
    let mut lines = String::new();
    for window in &windows {
        lines.push_str(&serde_json::to_string(window)?);
        lines.push('\n');
    }

    write_output(output, &lines)?;
    log::info!("{} windows from {} events", windows.len(), events.len());
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    landmarks: Option<usize>,
    json: bool,
) -> Result<(), HandframeCliError> {
    let events = read_events(input, &input_format)?;
    let results = LandmarkEventAdapter::validate_events(&events, landmarks);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - results.len(),
        invalid_events: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                event_id: r.event_id.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event {} (index {}): {}",
                    err.event_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(HandframeCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_doctor(
    config: Option<&Path>,
    upload_config: Option<&Path>,
    json: bool,
) -> Result<(), HandframeCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck::ok("version", format!("handframe version {}", HANDFRAME_VERSION)),
        DoctorCheck::ok("schema_version", format!("Input schema: {}", SCHEMA_VERSION)),
    ];

    if let Some(path) = config {
        checks.push(check_file(path, "session_config", |content| {
            let config = CaptureSessionConfig::from_json(content)?;
            config.validate()?;
            Ok(format!(
                "'{}': {} dataframes of {} x {} ({})",
                config.label,
                config.target_sample_count,
                config.dataframe_size,
                config.frame_width(),
                config.mode.as_str()
            ))
        }));
    }

    if let Some(path) = upload_config {
        checks.push(check_file(path, "upload_config", |content| {
            let config = UploadConfig::from_json(content)?;
            config.validate()?;
            Ok(format!(
                "{} (uploads {})",
                config.endpoint,
                if config.should_upload { "enabled" } else { "disabled" }
            ))
        }));
    }

    // Check stdin is available (for piped replays)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (replay ready)".to_string())
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: HANDFRAME_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("handframe Doctor Report");
        println!("=======================");
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HandframeCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), HandframeCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One event per tracked camera frame:");
                println!();
                println!("- landmarks: [{{ x, y, z? }}] for the first detected hand (21 points)");
                println!("  x and y are relative to image width/height, z is tracker depth");
                println!("- image_width: pixel width of the frame (needed for scale_and_translate)");
                println!("- timestamp: RFC 3339 capture time (optional)");
                println!("- event_id: free-form identifier (optional)");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: capture payload");
                println!();
                println!("{{ \"<label>\": [dataframe, ...] }}");
                println!();
                println!("- dataframe: dataframe_size frames (default 10)");
                println!("- frame: 2 x landmarks x components floats (126 in 3D, 84 in 2D)");
                println!("  the first half holds the hand, the second half is zero");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, HandframeCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_events(input: &Path, format: &InputFormat) -> Result<Vec<LandmarkEvent>, HandframeCliError> {
    let data = read_input(input)?;
    let events = match format {
        InputFormat::Ndjson => LandmarkEventAdapter::parse_ndjson(&data)?,
        InputFormat::Json => LandmarkEventAdapter::parse_array(&data)?,
    };
    Ok(events)
}

fn write_output(output: &Path, data: &str) -> Result<(), HandframeCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", data)?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn check_file(
    path: &Path,
    name: &str,
    parse: impl FnOnce(&str) -> Result<String, ComputeError>,
) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist", path.display()),
        };
    }

    match fs::read_to_string(path) {
        Ok(content) => match parse(&content) {
            Ok(message) => DoctorCheck::ok(name, message),
            Err(e) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        },
        Err(e) => DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", path.display(), e),
        },
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Hand landmarks for one tracked camera frame",
        "type": "object",
        "required": ["landmarks"],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "event_id": { "type": "string" },
            "timestamp": { "type": "string", "format": "date-time" },
            "image_width": { "type": "number", "exclusiveMinimum": 0 },
            "landmarks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["x", "y"],
                    "properties": {
                        "x": { "type": "number" },
                        "y": { "type": "number" },
                        "z": { "type": "number" }
                    }
                }
            }
        }
    }).to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "capture payload",
        "description": "Labeled dataframes collected by one capture session",
        "type": "object",
        "minProperties": 1,
        "maxProperties": 1,
        "additionalProperties": {
            "type": "array",
            "items": {
                "type": "array",
                "items": {
                    "type": "array",
                    "items": { "type": "number" }
                }
            }
        }
    }).to_string()
}

// Error types

#[derive(Debug)]
enum HandframeCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    Validation(handframe::schema::ValidationError),
    NoEvents,
    MissingLabel,
    Incomplete { collected: usize, target: usize },
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for HandframeCliError {
    fn from(e: io::Error) -> Self {
        HandframeCliError::Io(e)
    }
}

impl From<ComputeError> for HandframeCliError {
    fn from(e: ComputeError) -> Self {
        HandframeCliError::Compute(e)
    }
}

impl From<serde_json::Error> for HandframeCliError {
    fn from(e: serde_json::Error) -> Self {
        HandframeCliError::Json(e)
    }
}

impl From<handframe::schema::ValidationError> for HandframeCliError {
    fn from(e: handframe::schema::ValidationError) -> Self {
        HandframeCliError::Validation(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HandframeCliError> for CliError {
    fn from(e: HandframeCliError) -> Self {
        match e {
            HandframeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HandframeCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::InvalidConfig(_) => ("CONFIG_ERROR", "Run 'handframe doctor --config <file>'"),
                    ComputeError::UploadFailed(_) | ComputeError::UploadRejected(_) => {
                        ("UPLOAD_ERROR", "Check that the collection server is running and reachable")
                    }
                    _ => ("PARSE_ERROR", "Ensure input matches hand.landmarks.v1 schema"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            HandframeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HandframeCliError::Validation(e) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'handframe validate' for details".to_string()),
            },
            HandframeCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            HandframeCliError::MissingLabel => CliError {
                code: "MISSING_LABEL".to_string(),
                message: "No label given".to_string(),
                hint: Some("Pass --label or --config".to_string()),
            },
            HandframeCliError::Incomplete { collected, target } => CliError {
                code: "INCOMPLETE_SESSION".to_string(),
                message: format!("Collected {} of {} dataframes", collected, target),
                hint: Some("Record more frames or pass --allow-partial".to_string()),
            },
            HandframeCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            HandframeCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct CaptureReport {
    session_id: String,
    label: String,
    started_at: String,
    events: usize,
    dataframes: usize,
    target: usize,
    complete: bool,
    deliveries: Vec<DeliveryReceipt>,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    event_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
