use crate::classifier::TargetNote;
use crate::types::Note;

/// Passes a reading only when it is the requested note.
///
/// Without a target this is a plain tuner and every reading passes. With a
/// target the output answers "is the performer playing the requested note":
/// a confidently detected but different note comes out as `None`.
pub fn filter(raw: Option<&Note>, target: Option<&TargetNote>) -> Option<Note> {
    let note = raw?;
    match target {
        None => Some(note.clone()),
        Some(t) if t.name == note.name => Some(note.clone()),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(name: &str, cents: f64) -> Note {
        Note {
            name: name.into(),
            cents,
            frequency: 100.0,
            confidence: 0.95,
        }
    }

    #[test]
    fn test_free_mode_passes_everything() {
        let n = note("A2", -12.0);
        assert_eq!(filter(Some(&n), None), Some(n));
        assert_eq!(filter(None, None), None);
    }

    #[test]
    fn test_target_match_passes_unchanged() {
        let target = TargetNote::parse("E2").unwrap();
        let n = note("E2", 17.5);
        assert_eq!(filter(Some(&n), Some(&target)), Some(n));
    }

    #[test]
    fn test_other_note_is_blocked() {
        let target = TargetNote::parse("E2").unwrap();
        assert_eq!(filter(Some(&note("E3", 0.0)), Some(&target)), None);
        assert_eq!(filter(Some(&note("F2", 0.0)), Some(&target)), None);
        assert_eq!(filter(None, Some(&target)), None);
    }

    #[test]
    fn test_flat_spelled_target_matches_sharp_reading() {
        let target = TargetNote::parse("Gb2").unwrap();
        assert!(filter(Some(&note("F#2", 0.0)), Some(&target)).is_some());
    }
}
