//! One-off lookups: `catalink locate` and `catalink names`.

use std::path::PathBuf;

use catalink_recon::geo::{match_place, GeoMatch};
use catalink_recon::names::order_names;
use catalink_recon::Coordinate;

use crate::exit_codes::EXIT_RECON_LOOKUP;
use crate::lookup::HttpLookup;
use crate::settings::Settings;
use crate::CliError;

pub struct LocateArgs {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub tolerance: f64,
    pub language: Option<String>,
    pub config: Option<PathBuf>,
}

pub fn cmd_locate(args: LocateArgs) -> Result<(), CliError> {
    if !(-90.0..=90.0).contains(&args.lat) || !(-180.0..=180.0).contains(&args.lon) {
        return Err(CliError::args(format!(
            "coordinate out of range: {}, {}",
            args.lat, args.lon
        )));
    }
    if !(args.tolerance > 0.0 && args.tolerance <= 90.0) {
        return Err(CliError::args(format!(
            "--tolerance must be in (0, 90], got {}",
            args.tolerance
        )));
    }

    let settings = Settings::load(args.config.as_deref())?;
    let language = args
        .language
        .or_else(|| settings.recon.languages.first().cloned())
        .unwrap_or_else(|| "en".to_string());

    let lookup_err = |e: catalink_recon::LookupError| CliError {
        code: EXIT_RECON_LOOKUP,
        message: e.to_string(),
        hint: None,
    };
    let lookup = HttpLookup::from_settings(&settings.lookup, &language).map_err(lookup_err)?;
    let found = match_place(
        &lookup,
        &args.name,
        Coordinate::new(args.lat, args.lon),
        &language,
        args.tolerance,
    )
    .map_err(lookup_err)?;

    match &found {
        GeoMatch::ConfirmedByAddress { address } => {
            tracing::info!(name = %args.name, %address, "confirmed by address")
        }
        GeoMatch::Identified { hit, .. } => {
            tracing::info!(name = %args.name, id = %hit.id, label = %hit.label, "identified")
        }
        GeoMatch::NoMatch => tracing::info!(name = %args.name, "no match"),
    }

    let json = serde_json::to_string_pretty(&found)
        .map_err(|e| CliError::internal(format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

pub fn cmd_names(family: Option<String>, given: Option<String>, language: String) -> Result<(), CliError> {
    let blank = |part: &Option<String>| part.as_deref().map_or(true, |s| s.trim().is_empty());
    if blank(&family) && blank(&given) {
        return Err(CliError::args("no name to order").with_hint("pass --family and/or --given"));
    }
    let names = order_names(family.as_deref(), given.as_deref(), &language);
    for name in names {
        println!("{name}");
    }
    Ok(())
}
