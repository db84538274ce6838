#![recursion_limit = "256"]
//! NHL player stat prediction CLI
//!
//! Prepares rolled game-log features, trains the LSTM and predicts next-game statistics.

use clap::{Parser, Subcommand};
use hockey::{ComputeDevice, Config, Result};

#[derive(Parser)]
#[command(name = "hockey")]
#[command(about = "Next-game NHL player stat prediction using an LSTM", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Build team/opponent context and rolling features from the raw game logs
    Prepare {
        /// Raw game-log CSV (defaults to data.raw_path)
        #[arg(long)]
        input: Option<String>,
        /// Processed CSV to write (defaults to data.processed_path)
        #[arg(long)]
        output: Option<String>,
        /// Override the rolling window
        #[arg(long)]
        window: Option<usize>,
    },
    /// Train the LSTM on the processed table
    Train {
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override learning rate
        #[arg(long)]
        lr: Option<f64>,
        /// Override compute device (cpu or gpu)
        #[arg(long)]
        device: Option<ComputeDevice>,
    },
    /// Predict next-game stats for one or more players
    Predict {
        /// NHL player ids
        #[arg(required = true)]
        player_ids: Vec<i64>,
        /// Output format
        #[arg(long, default_value = "json")]
        format: OutputFormat,
    },
    /// Show the persisted feature and target definitions
    Info,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Prepare {
            input,
            output,
            window,
        } => commands::prepare(&config, input, output, window),
        Commands::Train { epochs, lr, device } => commands::train(&config, epochs, lr, device),
        Commands::Predict { player_ids, format } => {
            let ok = commands::predict(&config, &player_ids, format);
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Info => commands::info(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use burn::backend::{Autodiff, NdArray, Wgpu};
    use burn::tensor::backend::{AutodiffBackend, Backend};
    use hockey::data::{PlayerDirectory, RawRecordStore, SequenceWindower, Table};
    use hockey::features::{FeaturePipeline, PipelineArtifacts};
    use hockey::model::{StatLstm, StatLstmConfig};
    use hockey::predict::{format_prediction, PlayerPrediction, Predictor};
    use hockey::training::Trainer;
    use hockey::{HockeyError, PlayerId};

    type CpuBackend = NdArray<f32>;
    type GpuBackend = Wgpu<f32, i32>;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data/raw")?;
        std::fs::create_dir_all("data/processed")?;
        std::fs::create_dir_all("models")?;
        println!("Created data/ and models/ directories");

        println!("\nNext steps:");
        println!("  1. Place the ingested game logs at {}", config.data.raw_path);
        println!("  2. Run 'hockey prepare' to build rolling features");
        println!("  3. Run 'hockey train' to train the model");
        println!("  4. Run 'hockey predict <player_id>' to make predictions");

        Ok(())
    }

    pub fn prepare(
        config: &Config,
        input: Option<String>,
        output: Option<String>,
        window: Option<usize>,
    ) -> Result<()> {
        let mut pipeline_config = config.pipeline.clone();
        if let Some(w) = window {
            pipeline_config.rolling_window = w;
        }
        let input = input.unwrap_or_else(|| config.data.raw_path.clone());
        let output = output.unwrap_or_else(|| config.data.processed_path.clone());

        let raw = RawRecordStore::load(&input)?;
        println!("Loaded {} raw rows from {}", raw.len(), input);

        let table = FeaturePipeline::new(&pipeline_config)?.engineer(&raw)?;
        table.write_csv(&output)?;

        println!(
            "Wrote {} rows x {} columns to {}",
            table.len(),
            table.columns().len(),
            output
        );
        Ok(())
    }

    pub fn train(
        config: &Config,
        epochs: Option<usize>,
        lr: Option<f64>,
        device: Option<ComputeDevice>,
    ) -> Result<()> {
        let mut config = config.clone();
        if let Some(e) = epochs {
            config.training.epochs = e;
        }
        if let Some(lr) = lr {
            config.training.learning_rate = lr;
        }
        if let Some(d) = device {
            config.training.device = d;
        }

        println!("Training on {}", config.training.device);
        match config.training.device {
            ComputeDevice::Cpu => train_with::<Autodiff<CpuBackend>>(&config, Default::default()),
            ComputeDevice::Gpu => train_with::<Autodiff<GpuBackend>>(
                &config,
                burn::backend::wgpu::WgpuDevice::default(),
            ),
        }
    }

    fn train_with<B: AutodiffBackend>(config: &Config, device: B::Device) -> Result<()>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        let table = Table::read_csv(&config.data.processed_path)?;
        println!(
            "Loaded {} processed rows from {}",
            table.len(),
            config.data.processed_path
        );

        let windows = SequenceWindower::build(&table, &config.pipeline)?;
        println!("Training on targets: {:?}", windows.target_columns());
        println!("  {} feature columns", windows.feature_columns().len());

        let model_config = StatLstmConfig::from_model_config(
            &config.model,
            windows.feature_columns().len(),
            windows.target_columns().len(),
        );
        let model = StatLstm::<B>::new(&device, &model_config);
        let trainer = Trainer::new(model, &config.training, windows.target_columns(), device);

        println!("\nStarting training...\n");
        let (trained_model, history) = trainer.train(&windows)?;

        println!("\nSaving model to {}...", config.data.model_path);
        if let Some(parent) = std::path::Path::new(&config.data.model_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        trained_model.save(&config.data.model_path)?;
        windows.artifacts().save(&config.data.artifacts_path)?;

        println!("\nTraining complete!");
        if !history.val_losses.is_empty() {
            println!("  Best epoch:     {}", history.best_epoch + 1);
            println!("  Best val loss:  {:.4}", history.best_val_loss);
        }
        if let Some(mae) = history.last_mae() {
            for (col, value) in windows.target_columns().iter().zip(mae) {
                println!("  MAE {:<12} {:.3}", col, value);
            }
        }

        Ok(())
    }

    /// Prints predictions; returns false when any request failed
    pub fn predict(config: &Config, player_ids: &[i64], format: OutputFormat) -> bool {
        let players: Vec<PlayerId> = player_ids.iter().map(|&id| PlayerId(id)).collect();
        let results = match config.training.device {
            ComputeDevice::Cpu => predict_with::<CpuBackend>(config, &players, Default::default()),
            ComputeDevice::Gpu => predict_with::<GpuBackend>(
                config,
                &players,
                burn::backend::wgpu::WgpuDevice::default(),
            ),
        };

        let results = match results {
            Ok(results) => results,
            Err(e) => {
                match format {
                    OutputFormat::Json => println!("{}", error_json(&e)),
                    OutputFormat::Table => eprintln!("Error: {}", e),
                }
                return false;
            }
        };

        let all_ok = results.iter().all(|(_, r)| r.is_ok());
        match format {
            OutputFormat::Json => {
                let values: Vec<serde_json::Value> = results
                    .iter()
                    .map(|(_, result)| match result {
                        Ok(prediction) => serde_json::to_value(prediction)
                            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
                        Err(e) => serde_json::json!({ "error": e.to_string() }),
                    })
                    .collect();
                let output = if values.len() == 1 {
                    serde_json::to_string_pretty(&values[0])
                } else {
                    serde_json::to_string_pretty(&values)
                };
                match output {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return false;
                    }
                }
            }
            OutputFormat::Table => {
                let directory = PlayerDirectory::load(&config.data.player_mapping_path).unwrap_or_else(|e| {
                    log::debug!("No player mapping loaded: {}", e);
                    PlayerDirectory::default()
                });
                for (player, result) in &results {
                    match result {
                        Ok(prediction) => println!("{}", format_prediction(prediction, &directory)),
                        Err(e) => println!("{}: {}\n", directory.display_name(*player), e),
                    }
                }
            }
        }
        all_ok
    }

    fn predict_with<B: Backend>(
        config: &Config,
        players: &[PlayerId],
        device: B::Device,
    ) -> Result<Vec<(PlayerId, Result<PlayerPrediction>)>>
    where
        B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
        B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
    {
        if !std::path::Path::new(&config.data.artifacts_path).exists() {
            return Err(HockeyError::NoModel);
        }
        let artifacts = PipelineArtifacts::load(&config.data.artifacts_path)?;
        let table = Table::read_csv(&config.data.processed_path)?;
        let windows = SequenceWindower::from_artifacts(&table, artifacts)?;
        let predictor = Predictor::<B>::load(device, &config.data.model_path, &config.model, windows)?;

        Ok(predictor.predict_many(players))
    }

    /// `{"error": ...}` for failures before any player was predicted
    fn error_json(error: &HockeyError) -> String {
        serde_json::to_string_pretty(&serde_json::json!({ "error": error.to_string() }))
            .unwrap_or_else(|_| format!("{{\"error\": {:?}}}", error.to_string()))
    }

    pub fn info(config: &Config) -> Result<()> {
        if !std::path::Path::new(&config.data.artifacts_path).exists() {
            return Err(HockeyError::NoModel);
        }
        let artifacts = PipelineArtifacts::load(&config.data.artifacts_path)?;

        println!("Pipeline artifacts: {}", config.data.artifacts_path);
        println!("  Sequence length: {}", artifacts.sequence_length);
        println!("  Rolling window:  {}", artifacts.rolling_window);
        println!("\nTargets ({}):", artifacts.target_columns.len());
        let target_state = artifacts.target_scaler.state();
        let moments = target_state.mean.iter().zip(&target_state.variance);
        for (col, (mean, variance)) in artifacts.target_columns.iter().zip(moments) {
            println!("  {:<16} mean={:.3} std={:.3}", col, mean, variance.sqrt());
        }
        println!("\nFeatures ({}):", artifacts.feature_columns.len());
        for col in &artifacts.feature_columns {
            println!("  {}", col);
        }

        let model_file = format!("{}.mpk", config.data.model_path);
        if std::path::Path::new(&model_file).exists() {
            println!("\nModel: {}", model_file);
        } else {
            println!("\nModel: not trained");
        }
        Ok(())
    }
}
