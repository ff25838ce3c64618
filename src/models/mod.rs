pub mod cancellation;
pub mod comprobante;
pub mod invoice;
pub mod status;

pub use cancellation::{
    CancellationCommand, CancellationOutcome, CancellationRequest, LifecycleState, MotiveCode,
};
pub use comprobante::{ComprobanteModel, ConceptLine, Party, RelatedCfdi, TaxTotals};
pub use invoice::{Concept, InvoiceRecord, InvoiceRelations, RecordSource};
pub use status::{CanonicalStatus, ResolutionStatus, STATUS_CATALOG};
