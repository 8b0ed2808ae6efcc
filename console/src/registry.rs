use crate::types::SessionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChoice {
    Select(SessionId),
    Create,
}

/// Session picker: a trigger showing the current session and a chooser
/// listing every known session plus a create entry
#[derive(Debug, Default)]
pub struct SessionRegistry {
    chooser_open: bool,
}

impl SessionRegistry {
    pub fn trigger_label(&self, current: Option<&SessionId>) -> String {
        match current {
            Some(id) => format!("Session {id}"),
            None => "Select a session".to_string(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.chooser_open
    }

    pub fn open(&mut self) {
        self.chooser_open = true;
    }

    pub fn dismiss(&mut self) {
        self.chooser_open = false;
    }

    pub fn chooser_lines(&self, sessions: &[SessionId], current: Option<&SessionId>) -> Vec<String> {
        let mut lines: Vec<String> = sessions
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let marker = if Some(id) == current { '*' } else { ' ' };
                format!("{marker} {:>2}) {id}", i + 1)
            })
            .collect();
        lines.push("   n) + New session".to_string());
        lines
    }

    /// Resolve chooser input. Any valid choice closes the chooser; anything
    /// else leaves it open.
    pub fn choose(&mut self, input: &str, sessions: &[SessionId]) -> Option<RegistryChoice> {
        let input = input.trim();
        let choice = match input {
            "n" | "new" => Some(RegistryChoice::Create),
            _ => input
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| sessions.get(i))
                .map(|id| RegistryChoice::Select(id.clone())),
        };
        if choice.is_some() {
            self.chooser_open = false;
        }
        choice
    }
}
