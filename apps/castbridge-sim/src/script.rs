//! Line-oriented session scripts.
//!
//! One command per line; blank lines and `#` comments are skipped.
//!
//! ```text
//! discover
//! wait 200
//! devices
//! connect cast_living_room
//! load https://example.com/movie.mp4 Big Buck Bunny
//! seek 30000
//! state
//! disconnect
//! ```

use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use castbridge_core::{CastSessionHandle, MediaDescriptor, MediaKind};

/// A single script command.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Discover,
    StopDiscovery,
    Devices,
    Connect(String),
    Disconnect,
    Load { media: MediaDescriptor, position_ms: i64 },
    Play,
    Pause,
    Seek(i64),
    Stop,
    Volume(f64),
    Mute(bool),
    Picker,
    State,
    Wait(u64),
}

/// Parses a whole script. Errors carry the 1-based line number.
pub fn parse_script(source: &str) -> Result<Vec<ScriptCommand>> {
    let mut commands = Vec::new();
    for (index, line) in source.lines().enumerate() {
        if let Some(command) =
            parse_line(line).with_context(|| format!("line {}: {}", index + 1, line.trim()))?
        {
            commands.push(command);
        }
    }
    Ok(commands)
}

/// Parses one line; returns `None` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<ScriptCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "discover" => ScriptCommand::Discover,
        "stop-discovery" => ScriptCommand::StopDiscovery,
        "devices" => ScriptCommand::Devices,
        "connect" => ScriptCommand::Connect(required(rest, "device id")?.to_string()),
        "disconnect" => ScriptCommand::Disconnect,
        "load" | "load-audio" => parse_load(verb, rest)?,
        "play" => ScriptCommand::Play,
        "pause" => ScriptCommand::Pause,
        "seek" => ScriptCommand::Seek(
            required(rest, "position")?
                .parse()
                .context("position must be an integer (ms)")?,
        ),
        "stop" => ScriptCommand::Stop,
        "volume" => ScriptCommand::Volume(
            required(rest, "volume")?
                .parse()
                .context("volume must be a number")?,
        ),
        "mute" => match required(rest, "on|off")? {
            "on" => ScriptCommand::Mute(true),
            "off" => ScriptCommand::Mute(false),
            other => bail!("expected on|off, got {other}"),
        },
        "picker" => ScriptCommand::Picker,
        "state" => ScriptCommand::State,
        "wait" => ScriptCommand::Wait(
            required(rest, "duration")?
                .parse()
                .context("duration must be an integer (ms)")?,
        ),
        other => bail!("unknown command: {other}"),
    };

    Ok(Some(command))
}

fn required<'a>(rest: &'a str, what: &str) -> Result<&'a str> {
    if rest.is_empty() {
        Err(anyhow!("missing {what}"))
    } else {
        Ok(rest)
    }
}

/// `load[-audio] <url> [@<start ms>] [title...]`
fn parse_load(verb: &str, rest: &str) -> Result<ScriptCommand> {
    let mut parts = required(rest, "media url")?.splitn(2, char::is_whitespace);
    let url = parts.next().unwrap_or_default();
    let mut tail = parts.next().unwrap_or_default().trim();

    let mut position_ms = 0;
    if let Some(start) = tail.strip_prefix('@') {
        let (start, title) = start.split_once(char::is_whitespace).unwrap_or((start, ""));
        position_ms = start.parse().context("start position must be an integer (ms)")?;
        tail = title.trim();
    }

    let title = if tail.is_empty() { url } else { tail };
    let mut media = MediaDescriptor::new(url, title);
    if verb == "load-audio" {
        media.media_kind = MediaKind::Audio;
        media.content_type = Some("audio/mpeg".to_string());
    }

    Ok(ScriptCommand::Load { media, position_ms })
}

/// Runs `commands` against the session, writing query results to `out` as
/// JSON lines.
pub async fn run(
    session: &CastSessionHandle,
    commands: &[ScriptCommand],
    out: &mut dyn Write,
) -> Result<()> {
    for command in commands {
        log::debug!("[Script] {:?}", command);
        match command {
            ScriptCommand::Discover => session.start_discovery()?,
            ScriptCommand::StopDiscovery => session.stop_discovery()?,
            ScriptCommand::Devices => {
                let devices = session.discovered_devices().await?;
                writeln!(out, "{}", serde_json::json!({ "devices": devices }))?;
            }
            ScriptCommand::Connect(id) => session.connect(id.as_str())?,
            ScriptCommand::Disconnect => session.disconnect()?,
            ScriptCommand::Load { media, position_ms } => {
                session.load_media(media.clone(), true, *position_ms)?
            }
            ScriptCommand::Play => session.play()?,
            ScriptCommand::Pause => session.pause()?,
            ScriptCommand::Seek(position_ms) => session.seek(*position_ms)?,
            ScriptCommand::Stop => session.stop()?,
            ScriptCommand::Volume(volume) => session.set_volume(*volume)?,
            ScriptCommand::Mute(muted) => session.set_muted(*muted)?,
            ScriptCommand::Picker => session.show_airplay_picker()?,
            ScriptCommand::State => {
                let state = session.current_state().await?;
                writeln!(out, "{}", serde_json::json!({ "state": state }))?;
            }
            ScriptCommand::Wait(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use castbridge_core::{bootstrap_session, TokioSpawner};

    #[test]
    fn skips_blank_lines_and_comments() {
        let commands = parse_script("\n# setup\ndiscover\n\n  devices  \n").unwrap();
        assert_eq!(commands, vec![ScriptCommand::Discover, ScriptCommand::Devices]);
    }

    #[test]
    fn parses_arguments() {
        assert_eq!(
            parse_line("connect cast_den").unwrap(),
            Some(ScriptCommand::Connect("cast_den".to_string()))
        );
        assert_eq!(parse_line("seek 1500").unwrap(), Some(ScriptCommand::Seek(1500)));
        assert_eq!(parse_line("volume 0.25").unwrap(), Some(ScriptCommand::Volume(0.25)));
        assert_eq!(parse_line("mute off").unwrap(), Some(ScriptCommand::Mute(false)));
        assert_eq!(parse_line("wait 10").unwrap(), Some(ScriptCommand::Wait(10)));
    }

    #[test]
    fn load_takes_optional_start_and_title() {
        let Some(ScriptCommand::Load { media, position_ms }) =
            parse_line("load https://example.com/a.mp4 @5000 Big Buck Bunny").unwrap()
        else {
            panic!("expected load");
        };
        assert_eq!(media.content_url, "https://example.com/a.mp4");
        assert_eq!(media.title, "Big Buck Bunny");
        assert_eq!(position_ms, 5000);

        let Some(ScriptCommand::Load { media, position_ms }) =
            parse_line("load-audio https://example.com/a.mp3").unwrap()
        else {
            panic!("expected load");
        };
        assert_eq!(media.title, "https://example.com/a.mp3");
        assert_eq!(media.media_kind, MediaKind::Audio);
        assert_eq!(position_ms, 0);
    }

    #[test]
    fn errors_name_the_line() {
        let err = parse_script("discover\nseek soon\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));

        assert!(parse_line("connect").is_err());
        assert!(parse_line("mute maybe").is_err());
        assert!(parse_line("teleport").is_err());
    }

    #[tokio::test]
    async fn runs_against_simulated_session() {
        let config = SimConfig::default();
        let boot = bootstrap_session(
            &config.to_core_config(),
            config.backends(),
            TokioSpawner::current(),
        )
        .unwrap();

        let commands =
            parse_script("discover\ndevices\nconnect cast_living_room\nwait 50\nstate\n").unwrap();
        let mut out = Vec::new();
        run(&boot.session, &commands, &mut out).await.unwrap();

        let output = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let devices: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(devices["devices"].as_array().unwrap().len(), 3);

        let state: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(state["state"]["connectionState"], "connected");
        assert_eq!(state["state"]["activeProviderId"], "google_cast");

        boot.session.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn closed_session_fails_the_script() {
        let config = SimConfig::default();
        let boot = bootstrap_session(
            &config.to_core_config(),
            config.backends(),
            TokioSpawner::current(),
        )
        .unwrap();
        boot.session.dispose().await.unwrap();

        let mut out = Vec::new();
        let err = run(&boot.session, &[ScriptCommand::Play], &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
