use clap::Parser;
use ocspcheck::{
    load_certificates_from_file, CertificateFormat, HashAlgorithm, OcspConfig, OcspValidator, RevocationCheckError, ValidationReport,
    ValidationResult,
};
use serde_json::json;
use std::path::PathBuf;
use std::process;

/// OCSP revocation check for a certificate chain file.
#[derive(Parser, Debug)]
#[command(name = "ocspcheck-cli", version, about, long_about = None)]
struct Cli {
    /// PEM or DER chain, leaf first
    chain: PathBuf,

    /// Hostname the chain was presented for; selects the cache server and relay
    #[arg(long, default_value = "")]
    hostname: String,

    /// Reject the chain when a status cannot be determined
    #[arg(long)]
    fail_close: bool,

    /// POST requests to the responder instead of GET
    #[arg(long)]
    post: bool,

    /// Skip the OCSP cache server
    #[arg(long)]
    no_cache_server: bool,

    /// Route through the relay endpoints
    #[arg(long)]
    new_endpoint: bool,

    /// Hash algorithm for the OCSP CertID (sha1, sha256, sha384, sha512)
    #[arg(long)]
    hash: Option<String>,

    /// Output in JSON format
    #[arg(short, long)]
    json: bool,

    /// Show per-certificate outcomes and debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn config_from(cli: &Cli) -> Result<OcspConfig, String> {
    let mut config = OcspConfig::from_env();
    if cli.fail_close {
        config.fail_open = false;
    }
    if cli.post {
        config.use_post_method = true;
    }
    if cli.no_cache_server {
        config.use_cache_server = false;
    }
    if cli.new_endpoint {
        config.new_endpoint = true;
    }
    if !cli.hostname.is_empty() {
        config.hostname = Some(cli.hostname.clone());
    }
    if let Some(name) = &cli.hash {
        config.cert_id_hash = HashAlgorithm::from_name(name).map_err(|e| e.to_string())?;
    }
    Ok(config)
}

fn outcome_status(result: &ValidationResult) -> String {
    match result.error() {
        None => "good".to_string(),
        Some(error) => error.to_string(),
    }
}

fn print_report(report: &ValidationReport, verdict: &Result<bool, RevocationCheckError>, cli: &Cli) {
    if cli.json {
        let outcomes: Vec<_> = report
            .outcomes
            .iter()
            .map(|outcome| {
                json!({
                    "subject": outcome.subject,
                    "serial": outcome.serial,
                    "validated": outcome.result.is_validated(),
                    "from_cache": outcome.from_cache,
                    "error_code": outcome.result.error().and_then(|e| e.code()).map(|code| code.errno()),
                    "status": outcome_status(&outcome.result),
                })
            })
            .collect();
        let output = json!({
            "hostname": report.hostname,
            "accepted": verdict.is_ok(),
            "error_code": verdict.as_ref().err().map(|e| e.errno()),
            "error": verdict.as_ref().err().map(|e| e.message.clone()),
            "certificates": outcomes,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error formatting JSON: {}", e),
        }
        return;
    }

    if cli.verbose {
        println!("OCSP status for {}", cli.chain.display());
        println!("{}", "=".repeat(50));
        for outcome in &report.outcomes {
            let source = if outcome.from_cache { " (cached)" } else { "" };
            println!("{} [{}]{}: {}", outcome.subject, outcome.serial, source, outcome_status(&outcome.result));
        }
        println!();
    }

    match verdict {
        Ok(_) => println!("Chain accepted"),
        Err(e) => eprintln!("Chain rejected ({}): {}", e.errno(), e.message),
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match config_from(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid option: {}", e);
            process::exit(2);
        }
    };
    let fail_open = config.fail_open;
    let hostname = config.hostname.clone().unwrap_or_default();

    let validator = match OcspValidator::new(config) {
        Ok(validator) => validator,
        Err(e) => {
            eprintln!("Error creating validator ({}): {}", e.errno(), e.message);
            process::exit(1);
        }
    };

    let chain = match load_certificates_from_file(&cli.chain, CertificateFormat::Auto) {
        Ok(chain) => chain,
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.chain.display(), e);
            process::exit(1);
        }
    };

    let report = match validator.check_chain(&hostname, &chain) {
        Ok(report) => report,
        Err(e) => {
            if cli.json {
                println!("{}", json!({ "accepted": false, "error_code": e.errno(), "error": e.message }));
            } else {
                eprintln!("Chain rejected ({}): {}", e.errno(), e.message);
            }
            process::exit(1);
        }
    };

    let verdict = report.verdict(fail_open);
    print_report(&report, &verdict, &cli);
    if verdict.is_err() {
        process::exit(1);
    }
}
