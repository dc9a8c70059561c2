//! Single-line strings carrying one grid, for clipboard sharing.
//!
//! A layout string is `carillon:v1:<rows>x<columns>:<payload>`, where the
//! payload is the grid's JSON document in unpadded base64. Decoding yields the
//! same grid record a bare grid document holds, so an imported layout can be
//! written out and played directly.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use carillon_core::GridSize;
use carillon_system_recorder::{FormatError, GridRecord};
use thiserror::Error;

/// Prefix naming the format and its version.
pub(crate) const LAYOUT_PREFIX: &str = "carillon:v1:";

/// Reasons a layout string cannot be produced or read back.
#[derive(Debug, Error)]
pub(crate) enum LayoutError {
    #[error("layout string does not start with \"carillon:v1:\"")]
    MissingPrefix,
    #[error("layout string has no grid dimensions")]
    MissingDimensions,
    #[error("could not parse grid dimensions {0:?}")]
    InvalidDimensions(String),
    #[error("layout payload is not base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("layout payload is not a grid document")]
    Payload(#[from] serde_json::Error),
    #[error("layout describes an invalid grid")]
    Format(#[from] FormatError),
    #[error(
        "layout header says {header_rows}x{header_columns} but the grid is {rows}x{columns}"
    )]
    SizeMismatch {
        header_rows: u32,
        header_columns: u32,
        rows: u32,
        columns: u32,
    },
}

/// Encodes `grid` as a single line.
pub(crate) fn encode(grid: &GridRecord) -> Result<String, LayoutError> {
    let size = grid.layers.size()?;
    let json = serde_json::to_vec(grid)?;
    Ok(format!(
        "{LAYOUT_PREFIX}{}x{}:{}",
        size.rows(),
        size.columns(),
        STANDARD_NO_PAD.encode(json)
    ))
}

/// Decodes and validates a layout string.
pub(crate) fn decode(value: &str) -> Result<GridRecord, LayoutError> {
    let body = value
        .trim()
        .strip_prefix(LAYOUT_PREFIX)
        .ok_or(LayoutError::MissingPrefix)?;
    let (dimensions, payload) = body.split_once(':').ok_or(LayoutError::MissingDimensions)?;
    let header = parse_dimensions(dimensions)
        .ok_or_else(|| LayoutError::InvalidDimensions(dimensions.to_owned()))?;

    let bytes = STANDARD_NO_PAD.decode(payload.as_bytes())?;
    let grid: GridRecord = serde_json::from_slice(&bytes)?;
    let size = grid.restore()?.state.size();
    if size != header {
        return Err(LayoutError::SizeMismatch {
            header_rows: header.rows(),
            header_columns: header.columns(),
            rows: size.rows(),
            columns: size.columns(),
        });
    }
    Ok(grid)
}

fn parse_dimensions(dimensions: &str) -> Option<GridSize> {
    let (rows, columns) = dimensions.split_once(['x', 'X'])?;
    let size = GridSize::new(rows.trim().parse().ok()?, columns.trim().parse().ok()?);
    (!size.is_empty()).then_some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carillon_core::{
        CellCoord, Direction, GridMetadata, GridState, Motion, Structure, Tempo, Voice,
    };

    fn sample() -> GridRecord {
        let mut state = GridState::new(GridSize::new(8, 12));
        let _ = state
            .robots_mut()
            .insert(CellCoord::new(3, 4), Motion::new(Direction::West, 3));
        assert!(state.set_structure(CellCoord::new(7, 11), Some(Structure::Emitter(Voice::Vocal))));
        let metadata = GridMetadata {
            label: "lead".into(),
            tempo: Tempo::new(132).expect("valid tempo"),
        };
        GridRecord::capture(&metadata, &state)
    }

    fn with_payload(dimensions: &str, json: &str) -> String {
        format!("{LAYOUT_PREFIX}{dimensions}:{}", STANDARD_NO_PAD.encode(json))
    }

    #[test]
    fn layouts_survive_transfer() {
        let grid = sample();
        let encoded = encode(&grid).expect("encode");
        assert!(encoded.starts_with("carillon:v1:8x12:"));
        assert!(!encoded.contains('\n'));

        let decoded = decode(&format!("  {encoded}\n")).expect("decode");
        assert_eq!(decoded, grid);
        let restored = decoded.restore().expect("valid grid");
        assert_eq!(restored.metadata.tempo.bpm(), 132);
        assert_eq!(
            restored.state.robots().get(CellCoord::new(3, 4)),
            Some(Motion::new(Direction::West, 3))
        );
    }

    #[test]
    fn headers_must_match_the_encoded_grid() {
        let encoded = encode(&sample()).expect("encode");
        let swapped = encoded.replacen("8x12", "12x8", 1);
        assert!(matches!(
            decode(&swapped),
            Err(LayoutError::SizeMismatch {
                header_rows: 12,
                header_columns: 8,
                rows: 8,
                columns: 12,
            })
        ));
    }

    #[test]
    fn malformed_strings_are_rejected_with_a_reason() {
        assert!(matches!(decode("   "), Err(LayoutError::MissingPrefix)));
        assert!(matches!(
            decode("chime:v1:4x4:e30"),
            Err(LayoutError::MissingPrefix)
        ));
        assert!(matches!(
            decode("carillon:v2:4x4:e30"),
            Err(LayoutError::MissingPrefix)
        ));
        assert!(matches!(
            decode("carillon:v1:4x4"),
            Err(LayoutError::MissingDimensions)
        ));
        assert!(matches!(
            decode("carillon:v1:0x4:e30"),
            Err(LayoutError::InvalidDimensions(dimensions)) if dimensions == "0x4"
        ));
        assert!(matches!(
            decode("carillon:v1:4x4:!!"),
            Err(LayoutError::Encoding(_))
        ));
        assert!(matches!(
            decode("carillon:v1:4x4:e30"),
            Err(LayoutError::Payload(_))
        ));
    }

    #[test]
    fn payloads_describing_impossible_grids_are_rejected() {
        let robot_in_static = with_payload("1x1", r#"{"static": [[3]], "dynamic": [[0]]}"#);
        assert!(matches!(
            decode(&robot_in_static),
            Err(LayoutError::Format(FormatError::RobotInStaticLayer { row: 0, column: 0 }))
        ));

        let bad_tempo = with_payload("1x1", r#"{"tempo": 0, "static": [[0]], "dynamic": [[0]]}"#);
        assert!(matches!(
            decode(&bad_tempo),
            Err(LayoutError::Format(FormatError::InvalidTempo(0)))
        ));
    }
}
