//! Static stage catalog: the ordered sequences a document moves through,
//! keyed by direction. Loaded into the binary, never configurable at runtime.

use crate::error::WorkflowError;
use crate::types::{Direction, Stage};

/// Incoming documents: intake through archive, 11 stages.
pub const INCOMING: &[Stage] = &[
    Stage::Pending,
    Stage::ManualEntry,
    Stage::Received,
    Stage::Registration,
    Stage::Distribution,
    Stage::Analysis,
    Stage::DraftResponse,
    Stage::Review,
    Stage::SignatureProtocol,
    Stage::Acknowledgment,
    Stage::Archived,
];

/// Outgoing documents: draft through archive, 6 stages.
pub const OUTGOING: &[Stage] = &[
    Stage::Pending,
    Stage::Draft,
    Stage::Revision,
    Stage::SignatureProtocol,
    Stage::PrintedSent,
    Stage::Archived,
];

/// Ordered stage sequence for a direction.
pub fn sequence(direction: Direction) -> &'static [Stage] {
    match direction {
        Direction::In => INCOMING,
        Direction::Out => OUTGOING,
    }
}

/// Position of `stage` within its direction's sequence.
pub fn index_of(direction: Direction, stage: Stage) -> Result<usize, WorkflowError> {
    sequence(direction)
        .iter()
        .position(|s| *s == stage)
        .ok_or(WorkflowError::UnknownStage { direction, stage })
}

/// ARCHIVED is the only terminal stage, for both sequences.
pub fn is_terminal(stage: Stage) -> bool {
    stage == Stage::Archived
}

/// The stage after `stage` in its direction's sequence. `None` at the end.
pub fn next(direction: Direction, stage: Stage) -> Result<Option<Stage>, WorkflowError> {
    let idx = index_of(direction, stage)?;
    Ok(sequence(direction).get(idx + 1).copied())
}

/// First stage of a direction's sequence.
pub fn first(direction: Direction) -> Stage {
    // Both sequences open with PENDING.
    sequence(direction)[0]
}

// ─── Display metadata ─────────────────────────────────────────
//
// Presentation-only lookups for UI layers. The engine never reads these.

/// Spanish display label for a stage.
pub fn label(stage: Stage) -> &'static str {
    match stage {
        Stage::Pending => "Pendiente",
        Stage::ManualEntry => "Entrada Manual",
        Stage::Received => "Recibido",
        Stage::Registration => "Registro",
        Stage::Distribution => "Distribución",
        Stage::Analysis => "Análisis",
        Stage::DraftResponse => "Borrador de Respuesta",
        Stage::Review => "Revisión",
        Stage::SignatureProtocol => "Protocolo de Firma",
        Stage::Acknowledgment => "Acuse de Recibo",
        Stage::Archived => "Archivado",
        Stage::Draft => "Borrador",
        Stage::Revision => "Revisión",
        Stage::PrintedSent => "Impreso y Enviado",
    }
}

/// One-line description of what happens in a stage.
pub fn description(stage: Stage) -> &'static str {
    match stage {
        Stage::Pending => "Documento a la espera de procesamiento",
        Stage::ManualEntry => "Registro manual de entrada del documento",
        Stage::Received => "Recepción confirmada por mesa de entradas",
        Stage::Registration => "Registro con número correlativo",
        Stage::Distribution => "Distribución al despacho correspondiente",
        Stage::Analysis => "Análisis del contenido del documento",
        Stage::DraftResponse => "Preparación del borrador de respuesta",
        Stage::Review => "Revisión del borrador",
        Stage::SignatureProtocol => "Protocolo de firma del Ministro",
        Stage::Acknowledgment => "Acuse de recibo capturado",
        Stage::Archived => "Documento archivado",
        Stage::Draft => "Creación del borrador",
        Stage::Revision => "Revisión del documento saliente",
        Stage::PrintedSent => "Documento impreso y enviado",
    }
}
