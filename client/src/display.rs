//! Text rendering of server events for the terminal

use shared::{ClientId, PlayerSummary, ScoreEntry, ServerEvent};

/// Renders one event as terminal text. `me` marks the local player in
/// rosters once the server has told us our id.
pub fn format_event(event: &ServerEvent, me: Option<ClientId>) -> String {
    match event {
        ServerEvent::Welcome { client_id } => {
            format!("Connected as client {}. Type /help for commands.", client_id)
        }
        ServerEvent::RosterUpdate { players, master_id } => {
            format_roster(players, *master_id, me)
        }
        ServerEvent::Notice { text } => format!("* {}", text),
        ServerEvent::PrivateNotice { text } => format!("! {}", text),
        ServerEvent::RoundStarted {
            question,
            time_limit,
            master_id,
            master_name,
        } => {
            let asker = if Some(*master_id) == me {
                "You ask".to_string()
            } else {
                format!("{} asks", master_name)
            };
            format!("{}: {} ({}s to answer)", asker, question, time_limit)
        }
        ServerEvent::Tick { time_remaining } => format!("[{}s left]", time_remaining),
        ServerEvent::AnswerRevealed { answer } => format!("The answer was: {}", answer),
        ServerEvent::RoundWon {
            winner_name,
            answer,
            scores,
        } => format!(
            "{} wins! The answer was '{}'.\n{}",
            winner_name,
            answer,
            format_scores(scores)
        ),
        ServerEvent::MasterChanged {
            master_id,
            master_name,
        } => match (master_id, master_name) {
            (Some(id), _) if Some(*id) == me => "You are the next game master".to_string(),
            (Some(_), Some(name)) => format!("{} is the next game master", name),
            _ => "No game master until someone joins".to_string(),
        },
        ServerEvent::BecameMaster {} => {
            "You are the game master. Set a question with /question Q | A".to_string()
        }
    }
}

fn format_roster(
    players: &[PlayerSummary],
    master_id: Option<ClientId>,
    me: Option<ClientId>,
) -> String {
    if players.is_empty() {
        return "Players: (none)".to_string();
    }

    let mut lines = vec![format!("Players ({}):", players.len())];
    for player in players {
        let mut tags = Vec::new();
        if Some(player.id) == master_id {
            tags.push("master");
        }
        if Some(player.id) == me {
            tags.push("you");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        lines.push(format!(
            "  {}{}: {} points, {} guesses left",
            player.name, tags, player.score, player.guesses
        ));
    }
    lines.join("\n")
}

fn format_scores(scores: &[ScoreEntry]) -> String {
    let rows: Vec<String> = scores
        .iter()
        .map(|entry| format!("{}: {}", entry.name, entry.score))
        .collect();
    format!("Scores: {}", rows.join(", "))
}
