/// Interactive flux reconciliation console

use std::collections::BTreeMap;

use fluxrecon::flux::{encode_intervals, FluxReader};
use fluxrecon::*;
use rand::Rng;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing_subscriber::EnvFilter;

/// Command completer for the REPL
struct CommandCompleter {
    commands: Vec<&'static str>,
}

impl CommandCompleter {
    fn new() -> Self {
        Self {
            commands: vec![
                "clear",
                "config",
                "demo",
                "exit",
                "help",
                "json",
                "load",
                "map",
                "open",
                "preset",
                "protection",
                "quit",
                "read-sector",
                "reconcile",
                "sectors",
                "set",
                "stats",
                "tracks",
                "weak",
            ],
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete the first word (command name)
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Get the path to the history file
fn history_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".flux_history");
        p
    })
}

/// Console state
struct Session {
    config: ReadConfig,
    captures: BTreeMap<(u8, u8), TrackCapture>,
    result: Option<DiskResult>,
    stats: SessionStats,
}

impl Session {
    fn new() -> Self {
        Self {
            config: ReadConfig::default(),
            captures: BTreeMap::new(),
            result: None,
            stats: SessionStats::new(),
        }
    }

    fn track(&self, parts: &[String]) -> Option<&TrackResult> {
        let Some(result) = self.result.as_ref() else {
            println!("Nothing reconciled yet. Use 'reconcile' first.");
            return None;
        };
        let cylinder = parts.get(1).and_then(|s| parse_hex_or_dec(s)).unwrap_or(0);
        let head = parts.get(2).and_then(|s| parse_hex_or_dec(s)).unwrap_or(0);
        let track = result.track(cylinder, head);
        if track.is_none() {
            println!("Track {}/{} not found.", cylinder, head);
        }
        track
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .init();

    println!("=== Flux Reconciler ===");
    println!("Interactive console for decoding and merging floppy flux captures.");
    println!("Type 'help' for available commands\n");

    let mut rl = match Editor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to create editor: {}", e);
            return;
        }
    };
    rl.set_helper(Some(CommandCompleter::new()));

    // Load history if available
    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    let mut session = Session::new();

    loop {
        let readline = rl.readline("> ");
        let input = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        if parts.is_empty() {
            continue;
        }
        let command = parts[0].to_lowercase();

        match command.as_str() {
            "help" => {
                print_help();
            }
            "quit" | "exit" => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            "preset" => {
                let Some(key) = parts.get(1) else {
                    println!("Current: {}", session.config.disk_type);
                    for disk_type in DiskType::ALL {
                        println!("  {:<12} {}", disk_type.key(), disk_type.name());
                    }
                    continue;
                };
                match DiskType::from_key(key) {
                    Some(disk_type) => {
                        session.config = ReadConfig::preset(disk_type);
                        println!("Using {} preset", disk_type);
                    }
                    None => println!("Unknown disk type '{}'. Type 'preset' for a list.", key),
                }
            }
            "config" => match parts.get(1) {
                Some(path) => match ReadConfig::load(path) {
                    Ok(config) => {
                        println!("Loaded configuration from {}", path);
                        session.config = config;
                    }
                    Err(e) => println!("Error: {}", e),
                },
                None => match session.config.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("Error: {}", e),
                },
            },
            "set" => {
                if parts.len() < 3 {
                    println!("Usage: set <revolutions|retries|encoding|sample-freq|threshold> <value>");
                    continue;
                }
                match apply_setting(&mut session.config, &parts[1], &parts[2]) {
                    Ok(()) => println!("{} = {}", parts[1], parts[2]),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "open" | "load" => {
                if parts.len() < 4 {
                    println!("Usage: load <cylinder> <head> <flux file> [flux file ...]");
                    continue;
                }
                let (Some(cylinder), Some(head)) = (parse_hex_or_dec(&parts[1]), parse_hex_or_dec(&parts[2])) else {
                    println!("Invalid cylinder or head.");
                    continue;
                };
                match load_capture(cylinder, head, &parts[3..]) {
                    Ok(capture) => {
                        println!(
                            "Loaded {} revolutions for track {}/{}",
                            capture.revolutions.len(),
                            cylinder,
                            head
                        );
                        session.captures.insert((cylinder, head), capture);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "demo" => {
                let cylinders = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(4u8);
                session.config = ReadConfig::ibm_pc_dd();
                session.captures = synthesise_disk(cylinders, &session.config);
                session.result = None;
                println!(
                    "Generated {} tracks, {} revolutions each, weak bits on track 0 (IBM PC DD preset)",
                    session.captures.len(),
                    session.config.revolutions + 2
                );
            }
            "tracks" => {
                if session.captures.is_empty() {
                    println!("No captures loaded. Use 'load' or 'demo' first.");
                    continue;
                }
                println!("{:<6} {:<5} {:>5}  Flux bytes", "Cyl", "Head", "Revs");
                for capture in session.captures.values() {
                    let sizes: Vec<String> =
                        capture.revolutions.iter().map(|r| r.len().to_string()).collect();
                    println!(
                        "{:<6} {:<5} {:>5}  {}",
                        capture.cylinder,
                        capture.head,
                        capture.revolutions.len(),
                        sizes.join(" ")
                    );
                }
            }
            "reconcile" => {
                if session.captures.is_empty() {
                    println!("No captures loaded. Use 'load' or 'demo' first.");
                    continue;
                }
                let captures: Vec<TrackCapture> = session.captures.values().cloned().collect();
                match run_reconcile(&captures, &session.config) {
                    Ok(result) => {
                        session.stats.combine(&result.session);
                        println!(
                            "Reconciled {} tracks: {} CRC errors remain, {} protected",
                            result.tracks.len(),
                            result.crc_errors(),
                            result.session.protections_detected
                        );
                        session.result = Some(result);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "sectors" => {
                if let Some(track) = session.track(&parts) {
                    print!("{}", map::render_sector_table(&track.merged));
                }
            }
            "read-sector" => {
                if parts.len() < 4 {
                    println!("Usage: read-sector <cylinder> <head> <sector_id>");
                    continue;
                }
                let Some(sector_id) = parse_hex_or_dec(&parts[3]) else {
                    println!("Invalid sector ID.");
                    continue;
                };
                if let Some(track) = session.track(&parts) {
                    let (cylinder, head) = track.location();
                    match track.merged.read_sector(cylinder, head, sector_id) {
                        Some(data) => {
                            println!("Sector {}:{}:{} ({} bytes):", cylinder, head, sector_id, data.len());
                            print_hex_dump(data, 256);
                        }
                        None => println!("Sector {} has no good copy.", sector_id),
                    }
                }
            }
            "weak" => {
                if let Some(track) = session.track(&parts) {
                    match &track.weak {
                        Some(report) => {
                            map::draw_weak_map(report, 64);
                            let (error, message) = report.verify_verdict();
                            println!("{}: {}", if error { "VERIFY ERROR" } else { "ok" }, message);
                            for record in report.records.iter().take(16) {
                                println!(
                                    "  {:#06x} bit {}  {:>3}%  {:?}  {}",
                                    record.offset,
                                    record.bit_position,
                                    record.variation_percent,
                                    record.samples,
                                    record.pattern
                                );
                            }
                            if report.weak_bit_count() > 16 {
                                println!("  ... ({} more)", report.weak_bit_count() - 16);
                            }
                        }
                        None => println!("Fewer than two revolutions; no weak-bit analysis."),
                    }
                }
            }
            "json" => {
                if let Some(track) = session.track(&parts) {
                    match track.weak.as_ref().map(|r| r.to_legacy_json()) {
                        Some(Ok(json)) => println!("{}", json),
                        Some(Err(e)) => println!("Error: {}", e),
                        None => println!("No weak-bit report for this track."),
                    }
                }
            }
            "map" => {
                let head = parts.get(1).and_then(|s| parse_hex_or_dec(s)).unwrap_or(0);
                match &session.result {
                    Some(result) => map::draw_sector_map(result, head),
                    None => println!("Nothing reconciled yet. Use 'reconcile' first."),
                }
            }
            "protection" => match &session.result {
                Some(result) => {
                    let mut found = false;
                    for track in result.protected_tracks() {
                        found = true;
                        let (cylinder, head) = track.location();
                        if let Some(protection) = &track.protection {
                            print!("Track {}/{}: {}", cylinder, head, protection);
                        }
                        let weak = track
                            .weak
                            .as_ref()
                            .map(|r| protection::weak_sectors(&track.merged, r))
                            .unwrap_or_default();
                        if weak.is_empty() {
                            println!();
                        } else {
                            let ids: Vec<String> = weak.iter().map(|id| id.sector.to_string()).collect();
                            println!(" in sectors {}", ids.join(", "));
                        }
                    }
                    if !found {
                        println!("No protection detected");
                    }
                }
                None => println!("Nothing reconciled yet. Use 'reconcile' first."),
            },
            "stats" => {
                let stats = &session.stats;
                println!("Tracks analysed:      {}", stats.tracks_analyzed);
                println!("Weak bits found:      {}", stats.weak_bits_found);
                println!("Protections detected: {}", stats.protections_detected);
                println!("Average density:      {:.3} per 1000 bits", stats.avg_density);
                println!("Detector time:        {:.3?}", stats.total_time);
            }
            "clear" => {
                session.captures.clear();
                session.result = None;
                session.stats.reset();
                println!("Cleared captures and statistics.");
            }
            _ => {
                println!("Unknown command: {}. Type 'help' for available commands.", command);
            }
        }
    }
}

fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(current.clone());
                    current.clear();
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn print_help() {
    println!("Available commands:");
    println!("  load <cyl> <head> <file>...    - Load flux files, one per revolution (open)");
    println!("  demo [cylinders]               - Generate synthetic captures with weak bits");
    println!("  tracks                         - List loaded captures");
    println!("  preset [type]                  - Show presets or select one");
    println!("  config [path]                  - Show configuration or load it from JSON");
    println!("  set <key> <value>              - Change revolutions, retries, encoding, sample-freq, threshold");
    println!("  reconcile                      - Decode, merge and analyse every loaded track");
    println!("  sectors [cyl] [head]           - Sector table of a reconciled track");
    println!("  read-sector <cyl> <head> <id>  - Hex dump a recovered sector");
    println!("  weak [cyl] [head]              - Weak-bit map and verdict for a track");
    println!("  json [cyl] [head]              - Weak-bit report as JSON");
    println!("  map [head]                     - Visual sector map (white=ok, red=CRC, magenta=weak, yellow=deleted)");
    println!("  protection                     - List tracks flagged by weak-bit analysis");
    println!("  stats                          - Session statistics");
    println!("  clear                          - Drop captures and statistics");
    println!("  help                           - Show this help");
    println!("  quit, exit                     - Exit");
}

fn apply_setting(config: &mut ReadConfig, key: &str, value: &str) -> Result<()> {
    let number = || -> Result<u32> {
        value
            .parse()
            .map_err(|_| FluxError::invalid_input(format!("'{}' is not a number", value)))
    };
    let mut updated = config.clone();
    match key {
        "revolutions" => updated.revolutions = number()? as u8,
        "retries" => updated.retries = number()? as u8,
        "sample-freq" => updated.sample_freq_hz = number()?,
        "threshold" => updated.weak.variation_threshold = number()? as u8,
        "encoding" => {
            updated.encoding = match value.to_lowercase().as_str() {
                "auto" => Encoding::Auto,
                "fm" => Encoding::FM,
                "mfm" => Encoding::MFM,
                "mixed" => Encoding::Mixed,
                "rx02" => Encoding::RX02,
                _ => return Err(FluxError::invalid_input(format!("unknown encoding '{}'", value))),
            }
        }
        _ => return Err(FluxError::invalid_input(format!("unknown setting '{}'", key))),
    }
    updated.validate()?;
    *config = updated;
    Ok(())
}

fn load_capture(cylinder: u8, head: u8, paths: &[String]) -> Result<TrackCapture> {
    let mut capture = TrackCapture::new(cylinder, head);
    for path in paths {
        capture = capture.with_revolution(std::fs::read(path)?);
    }
    Ok(capture)
}

fn run_reconcile(captures: &[TrackCapture], config: &ReadConfig) -> Result<DiskResult> {
    #[cfg(feature = "parallel")]
    {
        par_reconcile_disk(captures, config, |_| TrackControl::Continue)
    }
    #[cfg(not(feature = "parallel"))]
    {
        reconcile_disk(captures, config, |track| {
            let (cylinder, head) = track.location();
            println!(
                "  {:>2}/{}  {} sectors, {} bad, {} replaced",
                cylinder,
                head,
                track.merged.sector_count(),
                track.merged.stats.crc_errors,
                track.replaced
            );
            TrackControl::Continue
        })
    }
}

/// Build captures of a nine sector disk with read noise
///
/// Every revolution gets flux jitter and a chance of a damaged sector.
/// Track 0 sector 1 carries a byte that reads differently on odd revolutions.
fn synthesise_disk(cylinders: u8, config: &ReadConfig) -> BTreeMap<(u8, u8), TrackCapture> {
    let mut rng = rand::thread_rng();
    let ticks = config
        .pll
        .nominal_period(config.sample_freq_hz, config.encoding)
        .round() as u32;
    let revolutions = config.revolutions as usize + 2;

    let mut captures = BTreeMap::new();
    for cylinder in 0..cylinders {
        let mut capture = TrackCapture::new(cylinder, 0);
        for rev in 0..revolutions {
            let mut builder = TrackBuilder::new(Encoding::MFM).gap(80, 0x4E);
            for r in 1..=9u8 {
                let mut data = vec![cylinder.wrapping_add(r); 512];
                if cylinder == 0 && r == 1 && rev % 2 == 1 {
                    data[100] ^= 0x10;
                }
                let fault = if rng.gen_bool(0.15) {
                    SectorFault::BadDataCrc
                } else {
                    SectorFault::None
                };
                builder = builder.sector_with(
                    SectorId::new(cylinder, 0, r, 2),
                    DamType::Normal,
                    &data,
                    fault,
                );
            }
            let clean = builder.gap(200, 0x4E).build_flux(ticks);
            let jittered: Vec<u32> = FluxReader::new(&clean)
                .map(|t| t.saturating_add_signed(rng.gen_range(-3..=3)))
                .collect();
            capture = capture.with_revolution(encode_intervals(&jittered));
        }
        captures.insert(capture.location(), capture);
    }
    captures
}

fn print_hex_dump(data: &[u8], max_bytes: usize) {
    let len = data.len().min(max_bytes);

    for (i, chunk) in data[..len].chunks(16).enumerate() {
        print!("{:04X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }

        // Pad if less than 16 bytes
        for j in chunk.len()..16 {
            print!("   ");
            if j == 7 {
                print!(" ");
            }
        }

        print!(" |");
        for byte in chunk {
            let c = if *byte >= 32 && *byte < 127 {
                *byte as char
            } else {
                '.'
            };
            print!("{}", c);
        }
        println!("|");
    }

    if data.len() > max_bytes {
        println!("... ({} more bytes)", data.len() - max_bytes);
    }
}

fn parse_hex_or_dec(s: &str) -> Option<u8> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
