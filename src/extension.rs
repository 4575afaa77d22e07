use serde::Serialize;

use crate::plugin::{PLUGIN_DESCRIPTION, PLUGIN_NAME};

/// A menu entry the host can show
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuCommand {
    pub menu: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const CONFIGURE_COMMAND: MenuCommand = MenuCommand {
    menu: "Extensions",
    name: "StarDist Configuration",
    description: "Choose the directory holding the *.pb model files",
};

pub const DETECT_COMMAND: MenuCommand = MenuCommand {
    menu: "Extensions",
    name: PLUGIN_NAME,
    description: PLUGIN_DESCRIPTION,
};

/// Extension metadata and the commands it installs
#[derive(Debug, Default, Clone, Copy)]
pub struct Extension;

impl Extension {
    pub fn name(&self) -> &'static str {
        "StarDist extension"
    }

    pub fn description(&self) -> &'static str {
        "Run StarDist nucleus detection on selected annotations.\n\
         See the extension repository for citation information."
    }

    pub fn commands(&self) -> Vec<MenuCommand> {
        vec![CONFIGURE_COMMAND, DETECT_COMMAND]
    }

    /// Register every command with `install`
    pub fn install<F: FnMut(MenuCommand)>(&self, mut install: F) {
        for command in self.commands() {
            install(command);
        }
    }
}
