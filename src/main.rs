use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use dhview::{Config, DMat4, Evaluation, JointValues, RobotView, Sample};

/// Interactive viewer for Denavit-Hartenberg robot descriptions.
#[derive(Parser, Debug)]
#[command(name = "dhview")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Built-in robot to show (see --list-samples)
    #[arg(long, conflicts_with = "robot")]
    sample: Option<Sample>,

    /// Robot description JSON file
    #[arg(long)]
    robot: Option<PathBuf>,

    /// Viewer configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial joint value, `name=value` (degrees for revolute joints)
    #[arg(long = "pose", value_name = "NAME=VALUE", value_parser = parse_pose_entry)]
    pose: Vec<(String, f64)>,

    /// Print every frame transform and exit without opening a window
    #[arg(long)]
    print_frames: bool,

    /// Print the transform of frame TO in frame FROM and exit
    #[arg(long, value_name = "FROM:TO", value_parser = parse_frame_pair)]
    relative: Option<(usize, usize)>,

    /// Also print the symbolic matrices, before any value is substituted
    #[arg(long)]
    symbolic: bool,

    /// List built-in robots and exit
    #[arg(long)]
    list_samples: bool,
}

fn parse_pose_entry(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing joint variable name in '{s}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for '{name}': {e}"))?;
    if !value.is_finite() {
        return Err(format!("value for '{name}' must be finite, got {value}"));
    }
    Ok((name.to_string(), value))
}

fn parse_frame_pair(s: &str) -> Result<(usize, usize), String> {
    let (from, to) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got '{s}'"))?;
    let frame = |text: &str| {
        text.trim()
            .parse::<usize>()
            .map_err(|e| format!("bad frame index '{text}': {e}"))
    };
    Ok((frame(from)?, frame(to)?))
}

fn print_matrix(m: &DMat4) {
    for row in 0..4 {
        let r = m.row(row);
        println!("  [{:8.4} {:8.4} {:8.4} {:8.4}]", r.x, r.y, r.z, r.w);
    }
}

fn print_evaluation(evaluation: Evaluation, frame: usize) {
    match evaluation.into_result(frame) {
        Ok(m) => print_matrix(&m),
        Err(unresolved) => log::warn!("{unresolved}"),
    }
}

fn print_frames(view: &RobotView, symbolic: bool) -> Result<()> {
    let (Some(model), Some(engine)) = (view.model(), view.engine()) else {
        bail!("--print-frames needs --sample or --robot");
    };
    println!("{} ({} joints)", model.name(), model.joint_count());
    let transforms = view.frame_transforms();
    for (frame, world) in transforms.iter().enumerate() {
        let origin = world.w_axis.truncate();
        println!(
            "frame {frame}: origin ({:.4}, {:.4}, {:.4})",
            origin.x, origin.y, origin.z
        );
        if symbolic {
            if let Some(total) = engine.total(frame) {
                print!("{total}");
            }
        }
        if let Some(evaluation) = view.evaluate(frame) {
            print_evaluation(evaluation, frame);
        }
    }
    Ok(())
}

fn print_relative(view: &RobotView, from: usize, to: usize, symbolic: bool) -> Result<()> {
    let Some(engine) = view.engine() else {
        bail!("--relative needs --sample or --robot");
    };
    let Some(evaluation) = view.evaluate_relative(from, to) else {
        bail!(
            "frames {from} and {to} must both be below {}",
            engine.len()
        );
    };
    println!("frame {to} in frame {from}:");
    if symbolic {
        if let Some(matrix) = engine.relative(from, to) {
            print!("{matrix}");
        }
    }
    print_evaluation(evaluation, to);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_samples {
        for sample in Sample::ALL {
            println!("{:<10} {}", sample.name(), sample.description());
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };

    let mut view = RobotView::new(&config);
    if let Some(sample) = cli.sample {
        view.load_sample(sample)
            .with_context(|| format!("building sample {sample}"))?;
    } else if let Some(path) = &cli.robot {
        let model = dhview::load_robot(path)
            .with_context(|| format!("loading robot {}", path.display()))?;
        view.load_model(model);
    } else {
        log::info!("no robot given; showing placeholder");
    }

    if !cli.pose.is_empty() {
        let pose: JointValues = cli.pose.into_iter().collect();
        let applied = view.apply_pose(&pose);
        if applied < pose.len() {
            log::warn!("{} of {} pose entries matched a joint", applied, pose.len());
        }
    }

    if let Some((from, to)) = cli.relative {
        return print_relative(&view, from, to, cli.symbolic);
    }
    if cli.print_frames {
        return print_frames(&view, cli.symbolic);
    }

    dhview::run(config.window.clone(), view)?;
    Ok(())
}
