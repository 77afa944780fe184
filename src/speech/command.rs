//! Speech engines backed by external programs.

use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

use super::input::{RecognitionEngine, RecognitionResult, RecognitionSession};
use super::output::{SynthesisEngine, Utterance, Voice};
use super::{find_program, SpeechError};

const SYNTHESIZERS: [&str; 3] = ["espeak-ng", "espeak", "say"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Espeak,
    Say,
}

/// Text-to-speech through espeak-ng, espeak or macOS `say`.
pub struct CommandSynthesizer {
    program: Option<(Flavor, PathBuf)>,
}

impl CommandSynthesizer {
    /// Use `configured` if given, otherwise the first known synthesizer on
    /// `PATH`.
    pub fn detect(configured: Option<&str>) -> Self {
        let program = match configured {
            Some(name) => find_program(name).map(|path| (flavor_of(name), path)),
            None => SYNTHESIZERS
                .iter()
                .find_map(|name| find_program(name).map(|path| (flavor_of(name), path))),
        };

        match &program {
            Some((_, path)) => tracing::info!("speech output via {}", path.display()),
            None => tracing::info!("no speech synthesizer found, read-aloud disabled"),
        }

        Self { program }
    }
}

fn flavor_of(program: &str) -> Flavor {
    let name = std::path::Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    if name == "say" {
        Flavor::Say
    } else {
        Flavor::Espeak
    }
}

impl SynthesisEngine for CommandSynthesizer {
    fn is_supported(&self) -> bool {
        self.program.is_some()
    }

    fn voices(&self) -> Vec<Voice> {
        let Some((flavor, path)) = &self.program else {
            return Vec::new();
        };

        let args: &[&str] = match flavor {
            Flavor::Espeak => &["--voices"],
            Flavor::Say => &["-v", "?"],
        };

        match std::process::Command::new(path).args(args).output() {
            Ok(output) if output.status.success() => {
                let listing = String::from_utf8_lossy(&output.stdout);
                match flavor {
                    Flavor::Espeak => parse_espeak_voices(&listing),
                    Flavor::Say => parse_say_voices(&listing),
                }
            }
            Ok(output) => {
                tracing::warn!("voice listing exited with {}", output.status);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("could not list voices: {}", e);
                Vec::new()
            }
        }
    }

    /// The text goes to the program on stdin so it can never be read as an
    /// option and is not bound by argument length limits.
    fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<Utterance, SpeechError> {
        let (flavor, path) = self.program.as_ref().ok_or(SpeechError::Unsupported)?;

        let mut command = Command::new(path);
        if let Some(voice) = voice {
            command.arg("-v").arg(&voice.id);
        }
        // `say` reads stdin when given no message
        if *flavor == Flavor::Espeak {
            command.arg("--stdin");
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpeechError::Engine("synthesizer stdin unavailable".to_string()))?;
        let text = text.to_string();

        let (done_tx, done_rx) = oneshot::channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = speak_to_end(&mut child, stdin, text) => outcome,
                _ = &mut cancel_rx => Ok(()),
            };
            // No-op once the program has exited
            let _ = child.start_kill();
            let _ = done_tx.send(outcome);
        });

        Ok(Utterance {
            done: done_rx,
            cancel: cancel_tx,
        })
    }
}

async fn speak_to_end(child: &mut Child, mut stdin: ChildStdin, text: String) -> Result<(), SpeechError> {
    stdin
        .write_all(text.as_bytes())
        .await
        .map_err(|e| SpeechError::Engine(e.to_string()))?;
    // Closing stdin marks the end of the text
    drop(stdin);

    match child.wait().await {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(SpeechError::Engine(format!("synthesizer exited with {}", status))),
        Err(e) => Err(SpeechError::Engine(e.to_string())),
    }
}

/// Parse `espeak-ng --voices`:
/// `Pty Language Age/Gender VoiceName File Other Languages`.
pub fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(Voice {
                id: fields[1].to_string(),
                name: fields[3].replace('_', " "),
                language: fields[1].to_string(),
            })
        })
        .collect()
}

fn say_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>.+?)\s+(?P<lang>[a-z]{2,3}[_-][A-Za-z0-9]+)\s+#")
            .expect("valid say pattern")
    })
}

/// Parse `say -v ?`: `Name  en_US  # sample sentence`.
pub fn parse_say_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter_map(|line| {
            let caps = say_line().captures(line)?;
            let name = caps["name"].trim().to_string();
            Some(Voice {
                id: name.clone(),
                name,
                language: caps["lang"].replace('_', "-"),
            })
        })
        .collect()
}

/// Speech-to-text through a user supplied program that streams results on
/// stdout, one per line.
pub struct CommandRecognizer {
    program: Option<PathBuf>,
}

impl CommandRecognizer {
    pub fn detect(configured: Option<&str>) -> Self {
        let program = configured.and_then(find_program);
        match &program {
            Some(path) => tracing::info!("speech input via {}", path.display()),
            None => tracing::info!("no speech recognizer configured, voice input disabled"),
        }
        Self { program }
    }
}

impl RecognitionEngine for CommandRecognizer {
    fn is_supported(&self) -> bool {
        self.program.is_some()
    }

    fn start(&self) -> Result<RecognitionSession, SpeechError> {
        let path = self.program.as_ref().ok_or(SpeechError::Unsupported)?;

        let mut child = Command::new(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpeechError::Engine("recognizer stdout unavailable".to_string()))?;

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(result) = parse_recognizer_line(&line) {
                                if results_tx.send(result).is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("recognizer output error: {}", e);
                            break;
                        }
                    },
                    _ = &mut stop_rx => break,
                }
            }
            let _ = child.kill().await;
        });

        Ok(RecognitionSession {
            results: results_rx,
            stop: stop_tx,
        })
    }
}

#[derive(Deserialize)]
struct RecognizerLine {
    text: String,
    #[serde(rename = "final", default = "finalized")]
    is_final: bool,
}

fn finalized() -> bool {
    true
}

/// A JSON object `{"text": ..., "final": bool}` or a plain finalized line.
pub fn parse_recognizer_line(line: &str) -> Option<RecognitionResult> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        let parsed: RecognizerLine = serde_json::from_str(line).ok()?;
        return Some(RecognitionResult {
            text: parsed.text,
            is_final: parsed.is_final,
        });
    }

    Some(RecognitionResult {
        text: line.to_string(),
        is_final: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::speech::test_support::write_script;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_espeak_listing() {
        let listing = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-us           --/M      English_(America)  gmw/en-US            (en 10)
 5  ne              --/M      Nepali             inc/ne
";
        let voices = parse_espeak_voices(listing);

        assert_eq!(voices.len(), 3);
        assert_eq!(
            voices[1],
            Voice {
                id: "en-us".into(),
                name: "English (America)".into(),
                language: "en-us".into(),
            }
        );
        assert_eq!(voices[2].language, "ne");
    }

    #[test]
    fn parses_say_listing() {
        let listing = "\
Alex                en_US    # Most people recognize me by my voice.
Bad News            en_US    # The light you see at the end of the tunnel.
Lekha               hi_IN    # नमस्ते
";
        let voices = parse_say_voices(listing);

        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].name, "Bad News");
        assert_eq!(voices[1].language, "en-US");
        assert_eq!(voices[2].id, "Lekha");
    }

    #[test]
    fn recognizer_lines() {
        assert_eq!(
            parse_recognizer_line(r#"{"text": "how do I", "final": false}"#),
            Some(RecognitionResult {
                text: "how do I".into(),
                is_final: false
            })
        );
        assert_eq!(
            parse_recognizer_line(r#"{"text": "renew"}"#).map(|r| r.is_final),
            Some(true)
        );
        assert_eq!(
            parse_recognizer_line("plain words"),
            Some(RecognitionResult {
                text: "plain words".into(),
                is_final: true
            })
        );
        assert_eq!(parse_recognizer_line("   "), None);
        assert_eq!(parse_recognizer_line("{broken"), None);
    }

    #[test]
    fn say_is_detected_by_file_name() {
        assert_eq!(flavor_of("/usr/bin/say"), Flavor::Say);
        assert_eq!(flavor_of("espeak-ng"), Flavor::Espeak);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn text_to_speak_arrives_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let args = dir.path().join("args");
        let heard = dir.path().join("heard");
        let program = write_script(
            dir.path(),
            "fake-espeak",
            &format!(
                "printf '%s\\n' \"$@\" > '{}'\ncat > '{}'",
                args.display(),
                heard.display()
            ),
        );

        let synthesizer = CommandSynthesizer::detect(Some(program.to_str().unwrap()));
        let voice = Voice {
            id: "en-us".into(),
            name: "English (America)".into(),
            language: "en-us".into(),
        };
        let Utterance { done, cancel: _cancel } = synthesizer
            .speak("- Article 16: right to live with dignity", Some(&voice))
            .unwrap();
        done.await.unwrap().unwrap();

        assert_eq!(std::fs::read_to_string(&args).unwrap(), "-v\nen-us\n--stdin\n");
        assert_eq!(
            std::fs::read_to_string(&heard).unwrap(),
            "- Article 16: right to live with dignity"
        );
    }

    #[test]
    fn unconfigured_recognizer_is_unsupported() {
        let recognizer = CommandRecognizer::detect(None);
        assert!(!recognizer.is_supported());
        assert!(matches!(recognizer.start(), Err(SpeechError::Unsupported)));
    }
}
