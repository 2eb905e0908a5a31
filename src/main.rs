use apfnav::logging::{LogConfig, LogOutput, init_logging, level_for_verbosity, parse_log_level};
use apfnav::realtime::run_realtime;
use apfnav::scenario::MissionConfig;
use apfnav::simulation::SimulationEngine;
use clap::{Arg, Command};

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("apfnav")
        .version("0.1.0")
        .about("APFマルチエージェント航法シミュレーション")
        .long_about("人工ポテンシャル場(APF)による各エージェントの加速度指令を計算し、\n\
                     障害物と他機を避けながらゴールへ移動させる時間駆動型シミュレーションです。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("ミッションファイル(.yaml)のパスを指定")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("ミッションの情報のみ表示して終了")
                .conflicts_with("realtime")
        )
        .arg(
            Arg::new("realtime")
                .short('r')
                .long("realtime")
                .action(clap::ArgAction::SetTrue)
                .help("エージェントごとのタスクで実時間実行")
        )
        .arg(
            Arg::new("agent")
                .short('a')
                .long("agent")
                .value_name("ID")
                .value_parser(clap::value_parser!(usize))
                .help("指定エージェントから見たシーンを表示")
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("実行結果をYAMLで書き出す")
                .conflicts_with("realtime")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)")
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");

    // ログ設定
    let level = match matches.get_one::<String>("log-level") {
        Some(level) => parse_log_level(level),
        None => level_for_verbosity(verbose_level),
    };
    let output = match matches.get_one::<String>("log-output").map(|s| s.parse::<LogOutput>()) {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
        None => LogOutput::Console,
    };
    let _log_guard = match init_logging(LogConfig { level, output, ..Default::default() }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: ログ初期化に失敗しました: {}", e);
            std::process::exit(1);
        }
    };

    println!("APFナビゲーション - apfnav v0.1.0");
    println!();

    if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        let options = RunOptions {
            info_only: matches.get_flag("info"),
            realtime: matches.get_flag("realtime"),
            agent: matches.get_one::<usize>("agent").copied(),
            output: matches.get_one::<String>("output").cloned(),
            verbose_level,
        };
        if let Err(e) = run_mission(scenario_path, &options) {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    } else {
        show_default_help();
    }
}

struct RunOptions {
    info_only: bool,
    realtime: bool,
    agent: Option<usize>,
    output: Option<String>,
    verbose_level: u8,
}

/// ミッションファイルを読み込んで実行
fn run_mission(scenario_path: &str, options: &RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mission = MissionConfig::from_file(scenario_path)?;

    if options.verbose_level > 0 {
        println!("ミッションファイル読み込み完了: {}", scenario_path);
    }

    mission.print_summary();
    println!();

    if let Some(agent_id) = options.agent {
        print_agent_scene(&mission, agent_id)?;
    }

    if options.info_only {
        return Ok(());
    }

    if options.realtime {
        execute_realtime(&mission)
    } else {
        execute_lockstep(mission, options)
    }
}

/// 1エージェントから見たシーンを表示
fn print_agent_scene(mission: &MissionConfig, agent_id: usize) -> Result<(), Box<dyn std::error::Error>> {
    let scene = mission.scene_for(agent_id)?;
    let start = scene.start();
    println!("=== Agent{} のシーン ===", agent_id);
    println!("開始位置: ({:.2}, {:.2}, {:.2})", start.x, start.y, start.z);
    println!("ゴール: ({:.2}, {:.2}, {:.2})", scene.agent_goal.x, scene.agent_goal.y, scene.agent_goal.z);
    println!("他エージェント: {}機", scene.agent_count() - 1);
    println!("障害物: {}個", scene.obstacles.len());
    println!();
    Ok(())
}

/// ロックステップ実行
fn execute_lockstep(mission: MissionConfig, options: &RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = SimulationEngine::new(mission, options.verbose_level);
    engine.initialize()?;
    let report = engine.run()?;

    println!();
    report.print_summary();

    if let Some(path) = &options.output {
        report.write_yaml(path)?;
        println!("実行結果を書き出しました: {}", path);
    }

    Ok(())
}

/// 実時間実行（エージェントごとに tokio タスク）
fn execute_realtime(mission: &MissionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;
    let outcomes = runtime.block_on(run_realtime(mission))?;

    println!();
    println!("=== 実時間実行結果 ===");
    for outcome in &outcomes {
        let p = outcome.final_state.position;
        println!(
            "  Agent{}: {}ティック (破棄 {}) / 位置 ({:.3}, {:.3}, {:.3}) / ゴールまで {:.4}m / 近接違反 {}件",
            outcome.agent_id,
            outcome.ticks,
            outcome.dropped_ticks,
            p.x, p.y, p.z,
            outcome.distance_to_goal,
            outcome.peer_violations + outcome.obstacle_violations
        );
    }

    Ok(())
}

/// デフォルトヘルプとミッション一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  apfnav [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>   ミッションファイルを指定して実行");
    println!("  -i, --info              ミッション情報のみ表示");
    println!("  -r, --realtime          エージェントごとのタスクで実時間実行");
    println!("  -a, --agent <ID>        指定エージェントから見たシーンを表示");
    println!("  -o, --output <FILE>     実行結果をYAMLで書き出す");
    println!("      --log-level <LEVEL> ログレベル");
    println!("      --log-output <TGT>  ログ出力先 (console, file, both)");
    println!("  -v, --verbose           詳細出力 (複数指定で詳細レベル上昇)");
    println!("  -h, --help              このヘルプを表示");
    println!();
    println!("利用可能なミッションファイル:");
    println!("  missions/mission_single_agent.yaml  - 単独エージェントの直線移動");
    println!("  missions/mission_obstacle.yaml      - 障害物の迂回");
    println!("  missions/mission_multi_agent.yaml   - 4機のすれ違い");
    println!();
    println!("例:");
    println!("  apfnav -s missions/mission_single_agent.yaml");
    println!("  apfnav -s missions/mission_multi_agent.yaml -v -o report.yaml");
    println!("  apfnav -s missions/mission_obstacle.yaml -i -a 0");
    println!("  apfnav -s missions/mission_multi_agent.yaml --realtime");
}
