use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};

use ai_2048_expectimax::agent::{Agent, GreedyAgent, RandomAgent};
use ai_2048_expectimax::engine::Move;
use ai_2048_expectimax::evaluate::{self, AblationRun, EvalSummary, GameResult};
use ai_2048_expectimax::expectimax::{Expectimax, ExpectimaxConfig, TimedConfig, TimedExpectimax};
use ai_2048_expectimax::game::GameState;
use ai_2048_expectimax::heuristic::{HeuristicWeights, WeightOverride};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ai-2048", about = "2048 with expectimax agents")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Let an agent play one game
    Play {
        #[command(flatten)]
        agent: AgentArgs,
        /// Game seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Print the board after every move
        #[arg(long)]
        show: bool,
    },
    /// Evaluate an agent over a batch of seeded games
    Eval {
        #[command(flatten)]
        agent: AgentArgs,
        #[arg(long, default_value_t = 30)]
        games: usize,
        /// Master seed the per-game seeds are drawn from
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Spread games over all cores (one agent per game)
        #[arg(long)]
        parallel: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
        /// Suppress the progress bar
        #[arg(long)]
        quiet: bool,
    },
    /// Play in the terminal with W/A/S/D
    Human {
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Play one timed-expectimax game per time budget
    Budget {
        /// Budgets in milliseconds
        #[arg(long, value_delimiter = ',', default_value = "20,50,100,1000,2000,5000")]
        budgets_ms: Vec<u64>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 8)]
        cap: usize,
    },
    /// Compare search depths, then each heuristic feature on its own
    Ablate {
        /// Depths for the depth runs
        #[arg(long, value_delimiter = ',', default_value = "1,2,3,4")]
        depths: Vec<u32>,
        /// Search depth for the heuristic runs
        #[arg(long, default_value_t = 3)]
        depth: u32,
        /// Games per run
        #[arg(long, default_value_t = 1)]
        games: usize,
        #[arg(long, default_value_t = 6)]
        cap: usize,
        #[arg(long, default_value_t = 10)]
        depth_seed: u64,
        #[arg(long, default_value_t = 5)]
        heuristic_seed: u64,
        /// One JSON object per run instead of summary lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AgentKind {
    Random,
    Greedy,
    Expectimax,
    Timed,
}

#[derive(Debug, Clone, Args)]
struct AgentArgs {
    #[arg(long, value_enum, default_value_t = AgentKind::Expectimax)]
    agent: AgentKind,
    /// Search depth (expectimax)
    #[arg(long, default_value_t = 3)]
    depth: u32,
    /// Time budget per move in milliseconds (timed)
    #[arg(long, default_value_t = 50)]
    budget_ms: u64,
    /// Deepest iteration the timed search may run
    #[arg(long)]
    max_depth: Option<u32>,
    /// Empty-cell cap at chance nodes, 0 disables sampling [default: 6, timed: 8]
    #[arg(long)]
    cap: Option<usize>,
    #[arg(long, default_value_t = 1.0)]
    gamma: f64,
    /// Seed for the agent's own RNG (defaults to the game seed)
    #[arg(long)]
    agent_seed: Option<u64>,
    /// Heuristic weight override, repeatable (keys: empty, mono, smooth, corner, pos)
    #[arg(long = "weight", value_name = "KEY=VALUE")]
    weights: Vec<WeightOverride>,
}

impl AgentArgs {
    fn weights(&self) -> HeuristicWeights { HeuristicWeights::default().with_overrides(&self.weights) }

    fn build(&self, fallback_seed: u64) -> Box<dyn Agent> {
        let seed = Some(self.agent_seed.unwrap_or(fallback_seed));
        match self.agent {
            AgentKind::Random => Box::new(RandomAgent::new(seed)),
            AgentKind::Greedy => Box::new(GreedyAgent),
            AgentKind::Expectimax => {
                let defaults = ExpectimaxConfig::default();
                Box::new(Expectimax::with_config(ExpectimaxConfig {
                    depth: self.depth,
                    empty_cell_cap: self.cap.unwrap_or(defaults.empty_cell_cap),
                    gamma: self.gamma,
                    seed,
                    weights: self.weights(),
                }))
            }
            AgentKind::Timed => {
                let defaults = TimedConfig::default();
                Box::new(TimedExpectimax::with_config(TimedConfig {
                    budget: Duration::from_millis(self.budget_ms),
                    empty_cell_cap: self.cap.unwrap_or(defaults.empty_cell_cap),
                    gamma: self.gamma,
                    seed,
                    max_depth: self.max_depth,
                    weights: self.weights(),
                }))
            }
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Cmd::Play { agent, seed, show } => play(&agent, seed, show),
        Cmd::Eval { agent, games, seed, parallel, json, quiet } => eval(&agent, games, seed, parallel, json, quiet),
        Cmd::Human { seed } => human(seed),
        Cmd::Budget { budgets_ms, seed, cap } => budget_sweep(&budgets_ms, seed, cap),
        Cmd::Ablate { depths, depth, games, cap, depth_seed, heuristic_seed, json } => {
            ablate(&depths, depth, games, cap, depth_seed, heuristic_seed, json)
        }
    }
}

fn play(args: &AgentArgs, seed: u64, show: bool) -> Result<()> {
    let mut agent = args.build(seed);
    let name = agent.name().to_string();
    let start = Instant::now();
    let result = evaluate::play_game_with(&mut agent, seed, |game, dir, out| {
        if show {
            println!("{name} chose {dir} | reward {}", out.reward);
            print!("{game}");
        }
    });
    info!(elapsed = ?start.elapsed(), "game finished");
    println!(
        "Final score: {}, Max tile: {}, Moves: {} ({:.1} moves/sec)",
        result.score,
        result.max_tile,
        result.moves,
        result.moves as f64 / start.elapsed().as_secs_f64().max(1e-6)
    );
    Ok(())
}

fn eval(args: &AgentArgs, games: usize, seed: u64, parallel: bool, json: bool, quiet: bool) -> Result<()> {
    if games == 0 {
        bail!("--games must be at least 1");
    }
    let pb = if quiet {
        None
    } else {
        let pb = ProgressBar::new(games as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} [{bar:30}] {pos}/{len} games | {msg}")
                .context("progress template")?
                .progress_chars("=> "),
        );
        pb.set_message(format!("{:?}", args.agent));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let summary: EvalSummary = if parallel {
        evaluate::evaluate_parallel(|| args.build(seed), games, seed, pb.as_ref())
    } else {
        let mut agent = args.build(seed);
        evaluate::evaluate_agent(&mut agent, games, seed, pb.as_ref())
    };
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}

fn human(seed: u64) -> Result<()> {
    let mut game = GameState::new(Some(seed));
    println!("Play with W/A/S/D. Ctrl+D quits.");
    print!("{game}");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while !game.is_game_over() {
        print!("Move> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let dir: Move = match line.context("reading stdin")?.parse() {
            Ok(dir) => dir,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        let out = game.step(dir);
        if out.info.invalid {
            println!("{dir} does not move anything.");
            continue;
        }
        println!("Reward: {}", out.reward);
        print!("{game}");
        if out.done {
            println!("Game over!");
        }
    }
    println!("Final score: {}, Max tile: {}", game.score(), game.max_tile());
    Ok(())
}

#[derive(Serialize)]
struct BudgetRun {
    budget_ms: u64,
    #[serde(flatten)]
    result: GameResult,
    elapsed_s: f64,
}

fn budget_sweep(budgets_ms: &[u64], seed: u64, cap: usize) -> Result<()> {
    for &ms in budgets_ms {
        let mut agent = TimedExpectimax::with_config(TimedConfig {
            budget: Duration::from_millis(ms),
            empty_cell_cap: cap,
            seed: Some(seed),
            ..Default::default()
        });
        debug!(budget_ms = ms, "starting budget run");
        let start = Instant::now();
        let result = evaluate::play_one_game(&mut agent, seed);
        let run = BudgetRun { budget_ms: ms, result, elapsed_s: start.elapsed().as_secs_f64() };
        println!("{}", serde_json::to_string(&run)?);
    }
    Ok(())
}

fn print_ablation(title: &str, runs: &[AblationRun], json: bool) -> Result<()> {
    if !json {
        println!("\n=== {title} ===");
    }
    for run in runs {
        if json {
            println!("{}", serde_json::to_string(run)?);
        } else {
            println!("{run}");
        }
    }
    Ok(())
}

fn ablate(
    depths: &[u32],
    depth: u32,
    games: usize,
    cap: usize,
    depth_seed: u64,
    heuristic_seed: u64,
    json: bool,
) -> Result<()> {
    if games == 0 {
        bail!("--games must be at least 1");
    }
    let base = ExpectimaxConfig { depth, empty_cell_cap: cap, seed: Some(depth_seed), ..Default::default() };
    let runs = evaluate::depth_ablation(&base, depths, games, depth_seed);
    print_ablation("DEPTH ABLATION", &runs, json)?;

    let base = ExpectimaxConfig { seed: Some(heuristic_seed), ..base };
    let runs = evaluate::heuristic_ablation(&base, games, heuristic_seed);
    print_ablation("HEURISTIC ABLATION", &runs, json)
}
