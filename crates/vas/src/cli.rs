use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "vas",
    author,
    version,
    about = "VAS : Visible Angle Shading shader preview",
    arg_required_else_help = false
)]
pub struct Args {
    /// Directory holding `vertex.glsl` and `scenes/sceneN.glsl`.
    #[arg(long, value_name = "DIR", default_value = "shader")]
    pub shader_dir: PathBuf,

    /// Scene manifest (TOML); defaults to `<shader-dir>/scenes.toml` when it exists.
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Initial window size (e.g. `1200x700`).
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_size,
        default_value = "1200x700"
    )]
    pub size: (u32, u32),

    /// Number of FPS samples kept for the chart.
    #[arg(
        long,
        value_name = "SAMPLES",
        value_parser = parse_history,
        default_value_t = renderer::DEFAULT_HISTORY_CAPACITY
    )]
    pub history: usize,

    /// Polls to wait for GPU timestamps before a frame's sample is dropped.
    #[arg(
        long,
        value_name = "POLLS",
        value_parser = parse_poll_limit,
        default_value_t = renderer::DEFAULT_MAX_POLLS
    )]
    pub timer_poll_limit: u64,

    /// Report shader failures in the log instead of a message box.
    #[arg(long)]
    pub no_dialogs: bool,

    /// Compile and link every configured shader, print the result and exit.
    #[arg(long)]
    pub check: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, e.g. 1200x700, got '{trimmed}'"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height.trim()))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_history(value: &str) -> Result<usize, String> {
    let samples: usize = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid sample count '{}'", value.trim()))?;
    if samples == 0 {
        return Err("history must hold at least one sample".to_string());
    }
    Ok(samples)
}

pub fn parse_poll_limit(value: &str) -> Result<u64, String> {
    let polls: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid poll limit '{}'", value.trim()))?;
    if polls == 0 {
        return Err("timer poll limit must be greater than zero".to_string());
    }
    Ok(polls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_window() {
        let args = Args::try_parse_from(["vas"]).unwrap();
        assert_eq!(args.shader_dir, PathBuf::from("shader"));
        assert_eq!(args.size, (1200, 700));
        assert_eq!(args.history, 500);
        assert_eq!(args.timer_poll_limit, 1_000_000);
        assert!(args.manifest.is_none());
        assert!(!args.no_dialogs);
        assert!(!args.check);
    }

    #[test]
    fn size_accepts_common_separators() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert_eq!(parse_size(" 800 X 600 "), Ok((800, 600)));
        assert_eq!(parse_size("1024×768"), Ok((1024, 768)));
    }

    #[test]
    fn size_rejects_malformed_input() {
        assert!(parse_size("1200").is_err());
        assert!(parse_size("0x700").is_err());
        assert!(parse_size("widexhigh").is_err());
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(parse_history("0").is_err());
        assert!(parse_poll_limit("0").is_err());
        assert_eq!(parse_history("32"), Ok(32));
        assert_eq!(parse_poll_limit("10"), Ok(10));
        assert!(Args::try_parse_from(["vas", "--history", "0"]).is_err());
    }

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from([
            "vas",
            "--shader-dir",
            "assets",
            "--manifest",
            "assets/list.toml",
            "--no-dialogs",
            "--check",
        ])
        .unwrap();
        assert_eq!(args.shader_dir, PathBuf::from("assets"));
        assert_eq!(args.manifest, Some(PathBuf::from("assets/list.toml")));
        assert!(args.no_dialogs);
        assert!(args.check);
    }
}
