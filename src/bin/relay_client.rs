use argh::FromArgs;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Relay client for submitting media and checking the remote endpoint
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "text", "box", "tracker", "video" or "info"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Text(TextCommand),
    BoxPrompt(BoxCommand),
    Tracker(TrackerCommand),
    Video(VideoCommand),
    Info(InfoCommand),
}

#[derive(FromArgs)]
/// Detect and segment objects named by a text prompt
#[argh(subcommand, name = "text")]
struct TextCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p')]
    prompt: String,

    /// detection confidence threshold
    #[argh(option, default = "0.5")]
    threshold: f64,

    /// mask threshold
    #[argh(option, default = "0.5")]
    mask_threshold: f64,
}

#[derive(FromArgs)]
/// Segment the object inside a bounding box
#[argh(subcommand, name = "box")]
struct BoxCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// box corners as x1,y1,x2,y2
    #[argh(option, short = 'b')]
    bbox: String,

    /// return several candidate masks
    #[argh(switch)]
    multimask: bool,
}

#[derive(FromArgs)]
/// Run the interactive tracker on an image
#[argh(subcommand, name = "tracker")]
struct TrackerCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// return several candidate masks
    #[argh(switch)]
    multimask: bool,
}

#[derive(FromArgs)]
/// Segment objects across the frames of a video
#[argh(subcommand, name = "video")]
struct VideoCommand {
    /// the path to the video
    #[argh(option, short = 'v')]
    video_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p')]
    prompt: String,

    /// maximum number of frames to process
    #[argh(option, default = "50")]
    max_frames: u32,

    /// remote processing timeout in seconds
    #[argh(option, default = "60")]
    timeout_seconds: u64,
}

#[derive(FromArgs)]
/// Show the remote endpoint description
#[argh(subcommand, name = "info")]
struct InfoCommand {}

async fn file_part(path: &Path) -> Result<Part, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let request = match args.command {
        ClientCommands::Text(cmd) => {
            let form = Form::new()
                .part("image", file_part(&cmd.image_path).await?)
                .text("prompt", cmd.prompt)
                .text("threshold", cmd.threshold.to_string())
                .text("maskThreshold", cmd.mask_threshold.to_string());
            client
                .post(format!("http://{}/analyze/text", addr))
                .multipart(form)
        }
        ClientCommands::BoxPrompt(cmd) => {
            let form = Form::new()
                .part("image", file_part(&cmd.image_path).await?)
                .text("box", format!("[{}]", cmd.bbox))
                .text("multimask", cmd.multimask.to_string());
            client
                .post(format!("http://{}/analyze/box", addr))
                .multipart(form)
        }
        ClientCommands::Tracker(cmd) => {
            let form = Form::new()
                .part("image", file_part(&cmd.image_path).await?)
                .text("multimask", cmd.multimask.to_string());
            client
                .post(format!("http://{}/analyze/tracker", addr))
                .multipart(form)
        }
        ClientCommands::Video(cmd) => {
            let form = Form::new()
                .part("video", file_part(&cmd.video_path).await?)
                .text("prompt", cmd.prompt)
                .text("maxFrames", cmd.max_frames.to_string())
                .text("timeoutSeconds", cmd.timeout_seconds.to_string());
            client
                .post(format!("http://{}/analyze/video", addr))
                .multipart(form)
        }
        ClientCommands::Info(_) => client.get(format!("http://{}/info", addr)),
    };

    let response = request.send().await?;
    let status = response.status();
    let result = response.json::<serde_json::Value>().await?;
    println!("Status: {}", status);
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
