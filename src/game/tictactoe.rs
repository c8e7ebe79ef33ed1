//! Tic-tac-toe reference engine

use serde::{Deserialize, Serialize};

use super::{GameEngine, GameError, GameFactory, GameStatus, GameType, PlayerId, PlayerInfo};

pub const GAME_TYPE: &str = "tictactoe";

const SIZE: usize = 3;

/// Every winning line, checked in order: rows, columns, diagonals
const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

type Board = [[Option<PlayerId>; SIZE]; SIZE];

/// Move payload: `{"row": 0, "col": 2}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Move {
    pub row: i64,
    pub col: i64,
}

/// Snapshot broadcast to clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicTacToeState {
    pub board: Board,
    pub current_player: Option<PlayerId>,
}

#[derive(Debug)]
pub struct TicTacToe {
    players: Vec<PlayerInfo>,
    state: TicTacToeState,
    status: GameStatus,
    winner: Option<PlayerInfo>,
}

impl TicTacToe {
    pub fn new(players: Vec<PlayerInfo>) -> Self {
        Self {
            players,
            state: TicTacToeState::default(),
            status: GameStatus::NotStarted,
            winner: None,
        }
    }

    #[cfg(test)]
    pub fn board(&self) -> &Board {
        &self.state.board
    }

    #[cfg(test)]
    pub fn current_player(&self) -> Option<&str> {
        self.state.current_player.as_deref()
    }

    fn cell(mv: &serde_json::Value) -> Result<(usize, usize), GameError> {
        let mv = Move::deserialize(mv)
            .map_err(|e| GameError::InvalidMove(format!("malformed move: {}", e)))?;

        let in_range = |v: i64| (0..SIZE as i64).contains(&v);
        if !in_range(mv.row) || !in_range(mv.col) {
            return Err(GameError::InvalidMove(format!(
                "cell ({}, {}) is off the board",
                mv.row, mv.col
            )));
        }

        Ok((mv.row as usize, mv.col as usize))
    }

    /// Owner of the first completed line, if any
    fn line_owner(&self) -> Option<&PlayerId> {
        let board = &self.state.board;
        LINES.iter().find_map(|line| {
            let [(r0, c0), (r1, c1), (r2, c2)] = *line;
            match (&board[r0][c0], &board[r1][c1], &board[r2][c2]) {
                (Some(a), Some(b), Some(c)) if a == b && b == c => Some(a),
                _ => None,
            }
        })
    }

    fn board_full(&self) -> bool {
        self.state.board.iter().flatten().all(Option::is_some)
    }

    /// Record a win or draw. Returns true when the game just ended.
    fn evaluate(&mut self) -> bool {
        if let Some(owner) = self.line_owner().cloned() {
            self.winner = self.players.iter().find(|p| p.id == owner).cloned();
            self.status = GameStatus::Over;
            return true;
        }

        if self.board_full() {
            self.winner = None;
            self.status = GameStatus::Over;
            return true;
        }

        false
    }

    fn opponent_of(&self, player_id: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|p| p.id != player_id)
            .map(|p| p.id.clone())
    }
}

impl GameEngine for TicTacToe {
    fn game_type(&self) -> GameType {
        GameType::from(GAME_TYPE)
    }

    fn state(&self) -> serde_json::Value {
        serde_json::to_value(&self.state).unwrap_or(serde_json::Value::Null)
    }

    fn start(&mut self) -> Result<(), GameError> {
        if self.players.len() != 2 {
            return Err(GameError::InsufficientPlayers {
                found: self.players.len(),
            });
        }

        self.state.current_player = Some(self.players[0].id.clone());
        self.status = GameStatus::InProgress;
        Ok(())
    }

    fn make_move(&mut self, player_id: &str, mv: &serde_json::Value) -> Result<(), GameError> {
        match self.status {
            GameStatus::NotStarted => return Err(GameError::NotStarted),
            GameStatus::Over => return Err(GameError::AlreadyOver),
            GameStatus::InProgress => {}
        }

        if self.state.current_player.as_deref() != Some(player_id) {
            return Err(GameError::OutOfTurn);
        }

        let (row, col) = Self::cell(mv)?;
        if self.state.board[row][col].is_some() {
            return Err(GameError::InvalidMove(format!(
                "cell ({}, {}) is already taken",
                row, col
            )));
        }

        self.state.board[row][col] = Some(player_id.to_string());

        if !self.evaluate() {
            self.state.current_player = self.opponent_of(player_id);
        }

        Ok(())
    }

    fn is_game_over(&self) -> bool {
        self.status == GameStatus::Over
    }

    fn winner(&self) -> Option<&PlayerInfo> {
        self.winner.as_ref()
    }

    fn status(&self) -> GameStatus {
        self.status
    }

    fn reset_state(&mut self) {
        self.state = TicTacToeState::default();
        self.status = GameStatus::NotStarted;
        self.winner = None;
    }
}

/// Registry factory for [`TicTacToe`]
pub struct TicTacToeFactory;

impl TicTacToeFactory {
    pub fn game_type() -> GameType {
        GameType::from(GAME_TYPE)
    }
}

impl GameFactory for TicTacToeFactory {
    fn display_name(&self) -> &str {
        "Tic Tac Toe"
    }

    fn create(&self, players: Vec<PlayerInfo>) -> Box<dyn GameEngine> {
        Box::new(TicTacToe::new(players))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn started() -> TicTacToe {
        let mut game = TicTacToe::new(vec![
            PlayerInfo::new("a", "Alice"),
            PlayerInfo::new("b", "Bob"),
        ]);
        game.start().unwrap();
        game
    }

    fn play(game: &mut TicTacToe, player: &str, row: i64, col: i64) -> Result<(), GameError> {
        game.make_move(player, &json!({ "row": row, "col": col }))
    }

    #[test]
    fn test_start_requires_two_players() {
        let mut game = TicTacToe::new(vec![PlayerInfo::new("a", "Alice")]);
        assert_eq!(
            game.start(),
            Err(GameError::InsufficientPlayers { found: 1 })
        );
        assert_eq!(game.status(), GameStatus::NotStarted);
    }

    #[test]
    fn test_first_registered_player_moves_first() {
        let game = started();
        assert_eq!(game.current_player(), Some("a"));
        assert_eq!(game.status(), GameStatus::InProgress);
    }

    #[test]
    fn test_move_before_start() {
        let mut game = TicTacToe::new(vec![
            PlayerInfo::new("a", "Alice"),
            PlayerInfo::new("b", "Bob"),
        ]);
        assert_eq!(play(&mut game, "a", 0, 0), Err(GameError::NotStarted));
    }

    #[test]
    fn test_turn_alternation() {
        let mut game = started();
        play(&mut game, "a", 0, 0).unwrap();
        assert_eq!(game.current_player(), Some("b"));
        play(&mut game, "b", 1, 1).unwrap();
        assert_eq!(game.current_player(), Some("a"));
    }

    #[test]
    fn test_out_of_turn_leaves_board_untouched() {
        let mut game = started();
        let before = game.board().clone();

        assert_eq!(play(&mut game, "b", 0, 0), Err(GameError::OutOfTurn));
        assert_eq!(game.board(), &before);
        assert_eq!(game.current_player(), Some("a"));
    }

    #[test]
    fn test_invalid_moves() {
        let mut game = started();

        assert!(matches!(play(&mut game, "a", 3, 0), Err(GameError::InvalidMove(_))));
        assert!(matches!(play(&mut game, "a", 0, -1), Err(GameError::InvalidMove(_))));
        assert!(matches!(
            game.make_move("a", &json!({ "row": "zero" })),
            Err(GameError::InvalidMove(_))
        ));

        play(&mut game, "a", 1, 1).unwrap();
        assert!(matches!(play(&mut game, "b", 1, 1), Err(GameError::InvalidMove(_))));
        assert_eq!(game.current_player(), Some("b"));
    }

    #[test]
    fn test_top_row_win() {
        let mut game = started();
        play(&mut game, "a", 0, 0).unwrap();
        play(&mut game, "b", 1, 1).unwrap();
        play(&mut game, "a", 0, 1).unwrap();
        play(&mut game, "b", 2, 2).unwrap();
        play(&mut game, "a", 0, 2).unwrap();

        assert!(game.is_game_over());
        assert_eq!(game.winner().map(|p| p.id.as_str()), Some("a"));
        // The mover does not switch once the game is decided
        assert_eq!(game.current_player(), Some("a"));
        assert_eq!(play(&mut game, "b", 2, 0), Err(GameError::AlreadyOver));
    }

    #[test]
    fn test_anti_diagonal_win() {
        let mut game = started();
        play(&mut game, "a", 0, 0).unwrap();
        play(&mut game, "b", 0, 2).unwrap();
        play(&mut game, "a", 0, 1).unwrap();
        play(&mut game, "b", 1, 1).unwrap();
        play(&mut game, "a", 2, 2).unwrap();
        play(&mut game, "b", 2, 0).unwrap();

        assert!(game.is_game_over());
        assert_eq!(game.winner().map(|p| p.id.as_str()), Some("b"));
    }

    #[test]
    fn test_draw() {
        let mut game = started();
        // a b a
        // a b b
        // b a a
        for (player, row, col) in [
            ("a", 0, 0),
            ("b", 0, 1),
            ("a", 0, 2),
            ("b", 1, 1),
            ("a", 1, 0),
            ("b", 1, 2),
            ("a", 2, 1),
            ("b", 2, 0),
            ("a", 2, 2),
        ] {
            play(&mut game, player, row, col).unwrap();
        }

        assert!(game.is_game_over());
        assert!(game.winner().is_none());
        assert_eq!(game.status(), GameStatus::Over);
    }

    #[test]
    fn test_is_game_over_is_idempotent() {
        let mut game = started();
        assert!(!game.is_game_over());
        assert!(!game.is_game_over());

        play(&mut game, "a", 0, 0).unwrap();
        play(&mut game, "b", 1, 0).unwrap();
        play(&mut game, "a", 0, 1).unwrap();
        play(&mut game, "b", 1, 1).unwrap();
        play(&mut game, "a", 0, 2).unwrap();

        for _ in 0..3 {
            assert!(game.is_game_over());
            assert_eq!(game.winner().map(|p| p.id.as_str()), Some("a"));
        }
    }

    #[test]
    fn test_reset_then_start_reproduces_initial_state() {
        let fresh = started();
        let initial_state = fresh.state();

        let mut game = started();
        play(&mut game, "a", 0, 0).unwrap();
        play(&mut game, "b", 1, 0).unwrap();
        play(&mut game, "a", 0, 1).unwrap();
        play(&mut game, "b", 1, 1).unwrap();
        play(&mut game, "a", 0, 2).unwrap();
        assert!(game.is_game_over());

        game.reset_state();
        assert_eq!(game.status(), GameStatus::NotStarted);
        assert!(game.winner().is_none());
        assert_eq!(game.players.len(), 2);

        game.start().unwrap();
        assert_eq!(game.state(), initial_state);
        assert_eq!(game.current_player(), Some("a"));
        assert!(!game.is_game_over());
    }

    #[test]
    fn test_state_snapshot_shape() {
        let mut game = started();
        play(&mut game, "a", 2, 1).unwrap();

        let state = game.state();
        assert_eq!(state["board"][2][1], json!("a"));
        assert_eq!(state["board"][0][0], serde_json::Value::Null);
        assert_eq!(state["current_player"], json!("b"));
    }

    fn reference_line(board: &Board) -> bool {
        LINES.iter().any(|line| {
            let [(r0, c0), (r1, c1), (r2, c2)] = *line;
            board[r0][c0].is_some()
                && board[r0][c0] == board[r1][c1]
                && board[r1][c1] == board[r2][c2]
        })
    }

    proptest! {
        #[test]
        fn prop_terminal_iff_line_or_full(
            order in Just((0usize..9).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut game = started();

            for (turn, cell) in order.into_iter().enumerate() {
                let mover = if turn % 2 == 0 { "a" } else { "b" };
                let (row, col) = ((cell / 3) as i64, (cell % 3) as i64);
                prop_assert!(play(&mut game, mover, row, col).is_ok());

                let line = reference_line(game.board());
                let full = game.board().iter().flatten().all(Option::is_some);

                prop_assert_eq!(game.is_game_over(), line || full);
                prop_assert_eq!(game.winner().is_some(), line);
                if line {
                    prop_assert_eq!(game.winner().map(|p| p.id.as_str()), Some(mover));
                }
                if game.is_game_over() {
                    break;
                }

                let other = if mover == "a" { "b" } else { "a" };
                prop_assert_eq!(game.current_player(), Some(other));
            }
        }
    }
}
