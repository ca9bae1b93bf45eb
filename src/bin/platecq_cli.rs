use platecq::csv_io::{read_table_csv, write_table_csv};
use platecq::efficiency::{
    efficiency_table, estimate_efficiency_by_target, EfficiencyOptions, OlsBackend,
};
use platecq::measurements::{attach_measurements, JoinKind};
use platecq::melt::{calculate_drdt, DrdtMethod};
use platecq::normalize::{delta_cq, deltadelta_cq, Aggregate};
use platecq::render_plate::{render_plate_svg, PlateTheme};
use platecq::table::{Table, COL_SAMPLE_ID, COL_TARGET_ID};
use platecq::PLATE_FORMATS;
use std::env;

fn usage() {
    eprintln!(
        "Usage:\n  \
  platecq_cli formats\n  \
  platecq_cli grid FORMAT\n  \
  platecq_cli join LAYOUT.csv MEASUREMENTS.csv [--join inner|left-measurements|left-layout] [--out OUT.csv]\n  \
  platecq_cli normalize LAYOUT.csv CQ.csv --ref-targets T1,T2 [--ref-samples S1,S2] [--agg median|mean] [--out OUT.csv]\n  \
  platecq_cli efficiency TABLE.csv [--replicate-term] [--out OUT.csv]\n  \
  platecq_cli drdt MELT.csv [--method spline|diff] [--lambda L] [--out OUT.csv]\n  \
  platecq_cli render TABLE.csv VALUE_COLUMN OUT.svg"
    );
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn load_table(path: &str) -> Result<Table, String> {
    read_table_csv(path).map_err(|e| e.to_string())
}

fn emit(table: &Table, args: &[String]) -> Result<(), String> {
    match flag_value(args, "--out") {
        Some(path) => write_table_csv(table, &path).map_err(|e| e.to_string()),
        None => {
            let text = serde_json::to_string_pretty(&table.to_json_records())
                .map_err(|e| e.to_string())?;
            println!("{text}");
            Ok(())
        }
    }
}

fn parse_join_kind(args: &[String]) -> Result<JoinKind, String> {
    match flag_value(args, "--join").as_deref() {
        None | Some("inner") => Ok(JoinKind::Inner),
        Some("left-measurements") => Ok(JoinKind::LeftOnMeasurements),
        Some("left-layout") => Ok(JoinKind::LeftOnLayout),
        Some(other) => Err(format!("unknown join kind '{other}'")),
    }
}

fn parse_agg(args: &[String]) -> Result<Aggregate, String> {
    match flag_value(args, "--agg").as_deref() {
        None | Some("median") => Ok(Aggregate::Median),
        Some("mean") => Ok(Aggregate::Mean),
        Some(other) => Err(format!("unknown aggregate '{other}'")),
    }
}

fn split_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn cmd_formats() -> Result<(), String> {
    for name in PLATE_FORMATS.names_sorted() {
        let format = PLATE_FORMATS.get(&name).expect("known name");
        println!("{name}\t{}", format.description());
    }
    Ok(())
}

fn cmd_grid(name: &str) -> Result<(), String> {
    let format = PLATE_FORMATS
        .get(name)
        .ok_or_else(|| format!("unknown plate format '{name}'"))?;
    let grid = format.grid().map_err(|e| e.to_string())?;
    let table = grid.to_table();
    let text =
        serde_json::to_string_pretty(&table.to_json_records()).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn cmd_join(args: &[String]) -> Result<(), String> {
    let layout = load_table(&args[0])?;
    let measurements = load_table(&args[1])?;
    let kind = parse_join_kind(args)?;
    let result = attach_measurements(&layout, &measurements, kind).map_err(|e| e.to_string())?;
    for advisory in &result.advisories {
        eprintln!("note: {advisory}");
    }
    emit(&result.table, args)
}

fn cmd_normalize(args: &[String]) -> Result<(), String> {
    let layout = load_table(&args[0])?;
    let measurements = load_table(&args[1])?;
    let ref_targets = flag_value(args, "--ref-targets")
        .map(|v| split_ids(&v))
        .ok_or_else(|| "--ref-targets is required".to_string())?;
    let agg = parse_agg(args)?;
    let joined = attach_measurements(&layout, &measurements, JoinKind::LeftOnMeasurements)
        .map_err(|e| e.to_string())?;
    for advisory in &joined.advisories {
        eprintln!("note: {advisory}");
    }
    let mut table =
        delta_cq(&joined.table, &ref_targets, COL_SAMPLE_ID, agg).map_err(|e| e.to_string())?;
    if let Some(ref_samples) = flag_value(args, "--ref-samples").map(|v| split_ids(&v)) {
        table = deltadelta_cq(&table, &ref_samples, COL_TARGET_ID, agg)
            .map_err(|e| e.to_string())?;
    }
    emit(&table, args)
}

fn cmd_efficiency(args: &[String]) -> Result<(), String> {
    let table = load_table(&args[0])?;
    let options = EfficiencyOptions {
        replicate_term: has_flag(args, "--replicate-term"),
    };
    let summaries = estimate_efficiency_by_target(&table, options, &OlsBackend)
        .map_err(|e| e.to_string())?;
    emit(&efficiency_table(&summaries), args)
}

fn cmd_drdt(args: &[String]) -> Result<(), String> {
    let table = load_table(&args[0])?;
    let method = match flag_value(args, "--method").as_deref() {
        None | Some("spline") => {
            let lambda = match flag_value(args, "--lambda") {
                Some(v) => v
                    .parse::<f64>()
                    .map_err(|_| format!("invalid --lambda '{v}'"))?,
                None => 0.05,
            };
            DrdtMethod::Spline { lambda }
        }
        Some("diff") => DrdtMethod::Diff,
        Some(other) => return Err(format!("unknown method '{other}'")),
    };
    let result = calculate_drdt(&table, method).map_err(|e| e.to_string())?;
    emit(&result, args)
}

fn cmd_render(args: &[String]) -> Result<(), String> {
    let table = load_table(&args[0])?;
    let doc =
        render_plate_svg(&table, &args[1], &PlateTheme::default()).map_err(|e| e.to_string())?;
    svg::save(&args[2], &doc).map_err(|e| e.to_string())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        usage();
        std::process::exit(1);
    };
    let rest = &args[2..];
    let result = match (command.as_str(), rest.len()) {
        ("formats", _) => cmd_formats(),
        ("grid", n) if n >= 1 => cmd_grid(&rest[0]),
        ("join", n) if n >= 2 => cmd_join(rest),
        ("normalize", n) if n >= 2 => cmd_normalize(rest),
        ("efficiency", n) if n >= 1 => cmd_efficiency(rest),
        ("drdt", n) if n >= 1 => cmd_drdt(rest),
        ("render", n) if n >= 3 => cmd_render(rest),
        _ => {
            usage();
            std::process::exit(1);
        }
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
