use std::path::PathBuf;
use std::{thread, time::Duration};

use anyhow::{anyhow, Context};
use clap::Parser;
use plate_pipeline::metrics;
use plate_pipeline::plate_reader_node::PlateReaderNode;
use plate_pipeline::reading_logger::ReadingLogger;
use plate_pipeline::video_reader::VideoReader;
use plate_reader::{DnnCharacterClassifier, DnnPlatePredictor, PlateReader, ReaderConfig};
use rusted_pipe::graph::metrics::Metrics;
use rusted_pipe::{
    buffers::synchronizers::timestamp::TimestampSynchronizer,
    graph::{
        build::{link, Graph},
        processor::{Node, SourceNode, TerminalNode},
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reads license plates from a video file, frame by frame.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long)]
    video: PathBuf,

    /// ONNX export of the plate detection network.
    #[arg(long)]
    detector: PathBuf,

    /// ONNX export of the character classifier.
    #[arg(long)]
    classifier: PathBuf,

    /// Class labels of the classifier, one per line.
    #[arg(long)]
    labels: PathBuf,

    /// JSON file overriding the default thresholds.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 20)]
    fps: usize,

    /// Start the video over when it ends.
    #[arg(long = "loop")]
    do_loop: bool,

    /// How long to run before stopping the graph.
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    #[arg(long)]
    gpu: bool,
}

fn setup_graph(args: &Args) -> anyhow::Result<Graph> {
    let config = match &args.config {
        Some(path) => ReaderConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReaderConfig::default(),
    };
    let reader = PlateReader::new(
        DnnPlatePredictor::from_onnx(&args.detector, args.gpu)?,
        DnnCharacterClassifier::from_files(&args.classifier, &args.labels, args.gpu)?,
        config,
    );

    // Node that reads the frames from the input file
    let mut video_input_node = SourceNode::create_common(
        "video_input".to_string(),
        Box::new(VideoReader::from_file(&args.video, args.fps, args.do_loop)?),
    );

    let timestamp_synch = TimestampSynchronizer::default();

    // Node that detects, rectifies and reads plates
    let mut plate_reader_node = Node::create_common(
        "plate_reader".to_string(),
        Box::new(PlateReaderNode::new(reader)),
        false,
        1,
        1,
        Box::new(timestamp_synch.clone()),
        true,
    );

    let logger_node = TerminalNode::create_common(
        "reading_logger".to_string(),
        Box::new(ReadingLogger::default()),
        false,
        2000,
        1,
        Box::new(timestamp_synch.clone()),
        true,
    );

    // Frame -> Plate reader
    link(
        video_input_node.write_channel.writer.c1(),
        plate_reader_node.read_channel.channels.write().unwrap().c1(),
    )
    .map_err(|_| anyhow!("cannot link video_input to plate_reader"))?;

    // Plate reader -> Logger
    link(
        plate_reader_node.write_channel.writer.c1(),
        logger_node.read_channel.channels.write().unwrap().c1(),
    )
    .map_err(|_| anyhow!("cannot link plate_reader to reading_logger"))?;

    let mut graph = Graph::new(Metrics::no_metrics());

    graph.start_terminal_node(logger_node);
    graph.start_node(plate_reader_node);
    graph.start_source_node(video_input_node);

    Ok(graph)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut graph = setup_graph(&args)?;

    info!("running for {} seconds", args.seconds);
    thread::sleep(Duration::from_secs(args.seconds));
    graph.stop(true, None);

    print!("{}", metrics::render()?);
    Ok(())
}
