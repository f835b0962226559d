//! Stdin commands driving the mock board.

use std::str::FromStr;
use std::time::Duration;

use acs_core::CredentialId;
use acs_hardware::mock::{
    MockButtonHandle, MockCardHandle, MockControls, MockOutputs, MockThermometerHandle,
};
use anyhow::{Context, anyhow, bail};

/// How long a `click` keeps the button down.
const CLICK_PRESS_MS: u64 = 150;

pub const HELP: &str = "\
commands:
  present <hex>      insert a credential (8 or 14 hex digits)
  remove             take the credential out
  click              short button press
  hold               press and keep the button down
  release            release the button
  switches <a> <b>   set the tamper switches (0/1)
  temp <celsius>     set the board temperature
  quit               stop the terminal";

/// Input side of a mock board.
#[derive(Debug, Clone)]
pub struct MockInputs {
    pub card: MockCardHandle,
    pub button: MockButtonHandle,
    pub thermometer: MockThermometerHandle,
}

impl MockInputs {
    /// Separate the inputs from the output receiver.
    pub fn split(controls: MockControls) -> (Self, MockOutputs) {
        let MockControls {
            card,
            button,
            thermometer,
            outputs,
        } = controls;
        (
            Self {
                card,
                button,
                thermometer,
            },
            outputs,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Present(CredentialId),
    Remove,
    Click,
    Hold,
    Release,
    Switches(bool, bool),
    Temp(f32),
    Quit,
}

fn parse_level(token: &str) -> anyhow::Result<bool> {
    match token.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "closed" => Ok(true),
        "0" | "off" | "false" | "open" => Ok(false),
        other => bail!("switch level must be 0 or 1, got {other:?}"),
    }
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| anyhow!("empty command"))?;
        let args: Vec<&str> = words.collect();

        let parsed = match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("present", [hex]) => ConsoleCommand::Present(
                hex.parse()
                    .with_context(|| format!("invalid credential {hex:?}"))?,
            ),
            ("remove", []) => ConsoleCommand::Remove,
            ("click", []) => ConsoleCommand::Click,
            ("hold", []) => ConsoleCommand::Hold,
            ("release", []) => ConsoleCommand::Release,
            ("switches", [first, second]) => {
                ConsoleCommand::Switches(parse_level(first)?, parse_level(second)?)
            }
            ("temp", [celsius]) => ConsoleCommand::Temp(
                celsius
                    .parse()
                    .with_context(|| format!("invalid temperature {celsius:?}"))?,
            ),
            ("quit" | "exit", []) => ConsoleCommand::Quit,
            (other, _) => bail!("unknown command or wrong arguments: {other}"),
        };
        Ok(parsed)
    }
}

impl ConsoleCommand {
    pub async fn apply(self, controls: &MockInputs) {
        match self {
            ConsoleCommand::Present(credential) => controls.card.present(credential),
            ConsoleCommand::Remove => controls.card.remove(),
            ConsoleCommand::Click => {
                controls.button.press();
                tokio::time::sleep(Duration::from_millis(CLICK_PRESS_MS)).await;
                controls.button.release();
            }
            ConsoleCommand::Hold => controls.button.press(),
            ConsoleCommand::Release => controls.button.release(),
            ConsoleCommand::Switches(first, second) => controls.card.set_switches(first, second),
            ConsoleCommand::Temp(celsius) => controls.thermometer.set(celsius),
            ConsoleCommand::Quit => {}
        }
    }
}
