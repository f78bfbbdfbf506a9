use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use koutei::client::{
    AudioSink, ConsoleNotifier, DeviceMicrophone, FileStore, HttpTransport, KeyValueStore,
    MemoryStore, Notifier, SpeakerSink, SpeechRecognizer, WhisperRecognizer,
};
use koutei::voice::{
    AudioCapture, AudioPlayback, DecodedAudio, SpeechToText, TextToSpeech, calculate_rms,
};
use koutei::{
    ApiServer, Config, ConversationController, SessionId, TurnHandler, TurnRequest, VoiceInput,
};

/// Koutei - a gentle Japanese listener you can talk to
#[derive(Parser)]
#[command(name = "koutei", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/koutei/config.toml)
    #[arg(short, long, env = "KOUTEI_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Directory holding a web front-end
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Talk to a running server from the terminal
    Chat {
        /// Server base URL
        #[arg(long, env = "KOUTEI_SERVER", default_value = "http://localhost:3000")]
        server: String,

        /// Enable microphone input
        #[arg(long)]
        voice: bool,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = koutei::persona::DEFAULT_GREETING)]
        text: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,koutei=info",
        1 => "info,koutei=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        static_dir: None,
    }) {
        Command::Serve { port, static_dir } => serve(config, port, static_dir).await,
        Command::Chat { server, voice } => chat(&config, &server, voice).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker(),
    }
}

async fn serve(
    config: Config,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.api_server.port);

    if !config.llm_configured() {
        tracing::warn!("OPENAI_API_KEY not set; turns will fail until it is configured");
    }
    if !config.tts_configured() {
        tracing::warn!(
            "ELEVENLABS_API_KEY or ELEVENLABS_VOICE_ID not set; turns will fail until configured"
        );
    }

    tracing::info!(
        port,
        model = %config.llm.model,
        tts_model = %config.voice.tts_model,
        "starting koutei"
    );

    let server = ApiServer::new(TurnHandler::from_config(&config), port)
        .with_static_dir(static_dir.or_else(|| config.api_server.static_dir.clone()));
    server.run().await?;
    Ok(())
}

/// A line typed at the chat prompt
#[derive(Debug, PartialEq, Eq)]
enum ChatInput {
    Text(String),
    ToggleVoice,
    SendVoice,
    Replay(usize),
    Quit,
    Help,
    Unknown(String),
}

fn parse_chat_input(line: &str) -> Option<ChatInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(ChatInput::Text(line.to_string()));
    };

    let mut parts = command.split_whitespace();
    Some(match (parts.next(), parts.next()) {
        (Some("quit" | "exit"), _) => ChatInput::Quit,
        (Some("voice"), _) => ChatInput::ToggleVoice,
        (Some("send"), _) => ChatInput::SendVoice,
        (Some("help"), _) => ChatInput::Help,
        (Some("replay"), Some(n)) => match n.parse() {
            Ok(index) => ChatInput::Replay(index),
            Err(_) => ChatInput::Unknown(line.to_string()),
        },
        _ => ChatInput::Unknown(line.to_string()),
    })
}

const CHAT_HELP: &str = "\
  text        send an utterance
  /voice      start or stop listening
  /send       send what was heard
  /replay N   replay the audio of message N
  /quit       leave";

fn print_new_messages(controller: &ConversationController, printed: &mut usize) {
    let new = controller.messages_since(*printed);
    for (offset, message) in new.iter().enumerate() {
        let index = *printed + offset;
        if message.is_user {
            println!("[{index}] あなた: {}", message.text);
        } else {
            let audio = if message.audio_url.is_some() { " ♪" } else { "" };
            println!("[{index}] koutei: {}{audio}", message.text);
        }
    }
    *printed += new.len();
}

fn session_store() -> Box<dyn KeyValueStore> {
    match FileStore::default_location() {
        Some(store) => Box::new(store),
        None => {
            tracing::warn!("no data directory; session id will not persist");
            Box::new(MemoryStore::default())
        }
    }
}

fn recognizer(
    config: &Config,
    events: mpsc::UnboundedSender<koutei::client::RecognitionEvent>,
) -> Option<Box<dyn SpeechRecognizer>> {
    let key = config.api_keys.openai.clone()?;
    let stt = SpeechToText::new_whisper(
        key,
        config.voice.stt_model.clone(),
        config.llm.base_url.clone(),
    )
    .map_err(|e| tracing::warn!(error = %e, "speech recognition unavailable"))
    .ok()?;

    WhisperRecognizer::new(Arc::new(stt), events)
        .map_err(|e| tracing::warn!(error = %e, "speech recognition unavailable"))
        .ok()
        .map(|r| Box::new(r) as Box<dyn SpeechRecognizer>)
}

async fn chat(config: &Config, server: &str, voice: bool) -> anyhow::Result<()> {
    let session_id = SessionId::load_or_create(&*session_store())?;
    tracing::debug!(%session_id, server, "starting chat");

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let sink = SpeakerSink::new().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "no speaker; replies will be text only");
        SpeakerSink::default()
    });
    let controller = Arc::new(ConversationController::new(
        Arc::new(HttpTransport::new(server)),
        Arc::new(sink) as Arc<dyn AudioSink>,
        Arc::clone(&notifier),
        session_id,
    ));

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let recognizer = if voice { recognizer(config, events_tx) } else { None };
    let mut voice_input = VoiceInput::new(recognizer, Box::new(DeviceMicrophone), notifier);

    let (done_tx, mut done) = mpsc::unbounded_channel::<()>();
    let spawn_turn = |request: Option<TurnRequest>| {
        let Some(request) = request else {
            println!("(まだ返事を待っています)");
            return;
        };
        let controller = Arc::clone(&controller);
        let done = done_tx.clone();
        tokio::spawn(async move {
            controller.complete_turn(request).await;
            let _ = done.send(());
        });
    };

    println!("koutei - /help for commands");
    spawn_turn(controller.begin_conversation());

    let mut printed = 0usize;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_chat_input(&line) {
                    None => {}
                    Some(ChatInput::Quit) => break,
                    Some(ChatInput::Help) => println!("{CHAT_HELP}"),
                    Some(ChatInput::Text(text)) => spawn_turn(controller.begin_utterance(&text)),
                    Some(ChatInput::ToggleVoice) => {
                        // opening the input device blocks until cpal is ready
                        let state = tokio::task::block_in_place(|| voice_input.toggle());
                        println!("(voice: {state:?})");
                    }
                    Some(ChatInput::SendVoice) => {
                        if voice_input.pending_input().trim().is_empty() {
                            println!("(nothing heard yet)");
                        } else {
                            spawn_turn(controller.begin_voice_utterance(&mut voice_input));
                        }
                    }
                    Some(ChatInput::Replay(index)) => {
                        if !controller.replay(index) {
                            println!("(no audio for message {index})");
                        }
                    }
                    Some(ChatInput::Unknown(input)) => println!("unknown command: {input}"),
                }
            }
            Some(event) = events.recv() => {
                voice_input.handle_event(event);
                let text = voice_input.input_text();
                if !text.is_empty() {
                    println!("> {text}");
                }
            }
            Some(()) = done.recv() => print_new_messages(&controller, &mut printed),
        }
    }

    controller.stop_audio();
    Ok(())
}

/// Test TTS output through ElevenLabs
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let key = config
        .api_keys
        .elevenlabs
        .clone()
        .ok_or_else(|| anyhow::anyhow!(koutei::turn::TTS_NOT_CONFIGURED))?;
    let voice_id = config
        .voice
        .voice_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!(koutei::turn::TTS_NOT_CONFIGURED))?;

    let tts = TextToSpeech::new_elevenlabs(
        key,
        voice_id,
        config.voice.tts_model.clone(),
        config.voice.tts_base_url.clone(),
    )?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize_to_vec(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    let handle = playback.play_mp3(&mp3_data)?;
    tokio::task::spawn_blocking(move || handle.wait()).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    // cpal input streams are not Send; keep the capture on one blocking thread
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;
        println!("Sample rate: {} Hz", koutei::voice::SAMPLE_RATE);
        println!("---");

        for i in 0..duration {
            std::thread::sleep(Duration::from_secs(1));

            let samples = capture.take_buffer();
            let energy = calculate_rms(&samples);
            let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

            // Visual meter
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

            println!(
                "[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]",
                i + 1
            );
        }

        capture.stop();
        Ok(())
    })
    .await??;

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    playback
        .play(DecodedAudio {
            samples,
            sample_rate,
        })?
        .wait();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}
