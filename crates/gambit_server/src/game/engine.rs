//! Rules engine seam and the shakmaty-backed implementation.
//!
//! The controller never decides move legality itself. Everything that needs
//! chess knowledge goes through [`RulesEngine`].

use super::Color;
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, Role, Square};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A move the engine accepted and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub from: Square,
    pub to: Square,
    pub role: Role,
    pub san: String,
    pub promotion: Option<Role>,
    pub captured: bool,
}

/// Chess rules as consumed by the game controller.
pub trait RulesEngine: Send + Sync + fmt::Debug {
    /// Applies `from -> to` if legal. `None` means rejected, with the
    /// position untouched.
    fn apply_move(&mut self, from: Square, to: Square, promotion: Option<Role>)
        -> Option<AppliedMove>;

    /// Position snapshot (FEN).
    fn snapshot(&self) -> String;

    fn turn(&self) -> Color;

    fn in_check(&self) -> bool;

    fn is_checkmate(&self) -> bool;

    fn is_stalemate(&self) -> bool;

    /// Rule-based draws other than stalemate.
    fn is_other_draw(&self) -> bool;

    fn legal_destinations(&self, from: Square) -> Vec<Square>;

    /// Disposable copy for dry runs.
    fn fork(&self) -> Box<dyn RulesEngine>;
}

/// Builds a fresh engine at the standard start position.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn RulesEngine> + Send + Sync>;

pub fn standard_engine_factory() -> EngineFactory {
    Arc::new(|| Box::new(ShakmatyEngine::standard()))
}

const FIFTY_MOVE_HALFMOVES: u32 = 100;
const REPETITION_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
pub struct ShakmatyEngine {
    position: Chess,
    /// Occurrences of each position, keyed on placement, side, castling and
    /// en passant.
    repetitions: HashMap<String, u32>,
}

impl ShakmatyEngine {
    pub fn standard() -> Self {
        let mut engine = Self {
            position: Chess::default(),
            repetitions: HashMap::new(),
        };
        engine.record_position();
        engine
    }

    fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    fn record_position(&mut self) {
        let key = repetition_key(&self.fen());
        *self.repetitions.entry(key).or_insert(0) += 1;
    }

    /// Source and destination as a player would enter them. Castling is
    /// expressed as the king's two-square move.
    fn endpoints(m: &Move) -> Option<(Square, Square)> {
        match m.to_uci(CastlingMode::Standard) {
            Uci::Normal { from, to, .. } => Some((from, to)),
            _ => None,
        }
    }

    fn find_move(&self, from: Square, to: Square, promotion: Option<Role>) -> Option<Move> {
        self.position.legal_moves().into_iter().find(|m| {
            Self::endpoints(m) == Some((from, to))
                && (m.promotion().is_none() || m.promotion() == promotion)
        })
    }
}

fn repetition_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

fn to_color(color: shakmaty::Color) -> Color {
    match color {
        shakmaty::Color::White => Color::White,
        shakmaty::Color::Black => Color::Black,
    }
}

impl RulesEngine for ShakmatyEngine {
    fn apply_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Option<AppliedMove> {
        let m = self.find_move(from, to, promotion)?;
        let role = m.role();
        let captured = m.is_capture();
        let promoted = m.promotion();

        let san = SanPlus::from_move_and_play_unchecked(&mut self.position, &m).to_string();
        self.record_position();

        Some(AppliedMove {
            from,
            to,
            role,
            san,
            promotion: promoted,
            captured,
        })
    }

    fn snapshot(&self) -> String {
        self.fen()
    }

    fn turn(&self) -> Color {
        to_color(self.position.turn())
    }

    fn in_check(&self) -> bool {
        self.position.is_check()
    }

    fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    fn is_stalemate(&self) -> bool {
        self.position.is_stalemate()
    }

    fn is_other_draw(&self) -> bool {
        if self.position.is_insufficient_material() {
            return true;
        }
        if self.position.halfmoves() >= FIFTY_MOVE_HALFMOVES {
            return true;
        }
        let key = repetition_key(&self.fen());
        self.repetitions.get(&key).copied().unwrap_or(0) >= REPETITION_LIMIT
    }

    fn legal_destinations(&self, from: Square) -> Vec<Square> {
        let mut destinations: Vec<Square> = self
            .position
            .legal_moves()
            .iter()
            .filter_map(Self::endpoints)
            .filter(|(source, _)| *source == from)
            .map(|(_, to)| to)
            .collect();
        destinations.sort();
        destinations.dedup();
        destinations
    }

    fn fork(&self) -> Box<dyn RulesEngine> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn play(engine: &mut ShakmatyEngine, moves: &[(Square, Square)]) {
        for (from, to) in moves {
            assert!(
                engine.apply_move(*from, *to, Some(Role::Queen)).is_some(),
                "expected {from}{to} to be legal"
            );
        }
    }

    #[test]
    fn test_standard_start() {
        let engine = ShakmatyEngine::standard();
        assert_eq!(engine.snapshot(), START_FEN);
        assert_eq!(engine.turn(), Color::White);
        assert!(!engine.in_check());
        assert!(!engine.is_other_draw());
    }

    #[test]
    fn test_apply_legal_move() {
        let mut engine = ShakmatyEngine::standard();
        let applied = engine.apply_move(Square::E2, Square::E4, Some(Role::Queen)).unwrap();

        assert_eq!(applied.san, "e4");
        assert_eq!(applied.role, Role::Pawn);
        assert!(!applied.captured);
        assert!(applied.promotion.is_none());
        assert_eq!(engine.turn(), Color::Black);
        assert!(engine.snapshot().starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
    }

    #[test]
    fn test_illegal_move_leaves_position() {
        let mut engine = ShakmatyEngine::standard();
        assert!(engine.apply_move(Square::E2, Square::E5, None).is_none());
        assert!(engine.apply_move(Square::E7, Square::E5, None).is_none());
        assert_eq!(engine.snapshot(), START_FEN);
    }

    #[test]
    fn test_fools_mate() {
        let mut engine = ShakmatyEngine::standard();
        play(
            &mut engine,
            &[
                (Square::F2, Square::F3),
                (Square::E7, Square::E5),
                (Square::G2, Square::G4),
                (Square::D8, Square::H4),
            ],
        );
        assert!(engine.in_check());
        assert!(engine.is_checkmate());
        assert!(!engine.is_stalemate());
        assert_eq!(engine.turn(), Color::White);
    }

    #[test]
    fn test_castling_uses_king_destination() {
        let mut engine = ShakmatyEngine::standard();
        play(
            &mut engine,
            &[
                (Square::E2, Square::E4),
                (Square::E7, Square::E5),
                (Square::G1, Square::F3),
                (Square::B8, Square::C6),
                (Square::F1, Square::C4),
                (Square::G8, Square::F6),
            ],
        );
        assert!(engine.legal_destinations(Square::E1).contains(&Square::G1));
        let applied = engine.apply_move(Square::E1, Square::G1, Some(Role::Queen)).unwrap();
        assert_eq!(applied.san, "O-O");
        assert_eq!(applied.role, Role::King);
    }

    #[test]
    fn test_legal_destinations_from_start() {
        let engine = ShakmatyEngine::standard();
        assert_eq!(engine.legal_destinations(Square::G1), vec![Square::F3, Square::H3]);
        assert_eq!(engine.legal_destinations(Square::E2), vec![Square::E3, Square::E4]);
        assert!(engine.legal_destinations(Square::E1).is_empty());
        assert!(engine.legal_destinations(Square::E7).is_empty());
    }

    #[test]
    fn test_threefold_repetition_is_a_draw() {
        let mut engine = ShakmatyEngine::standard();
        let shuffle = [
            (Square::G1, Square::F3),
            (Square::G8, Square::F6),
            (Square::F3, Square::G1),
            (Square::F6, Square::G8),
        ];
        play(&mut engine, &shuffle);
        assert!(!engine.is_other_draw());
        play(&mut engine, &shuffle);
        assert!(engine.is_other_draw());
    }

    #[test]
    fn test_fork_is_independent() {
        let engine = ShakmatyEngine::standard();
        let mut fork = engine.fork();
        assert!(fork.apply_move(Square::D2, Square::D4, None).is_some());
        assert_eq!(engine.snapshot(), START_FEN);
        assert_eq!(fork.turn(), Color::Black);
    }
}
