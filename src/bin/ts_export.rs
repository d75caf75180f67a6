// TypeScript bindings for the dashboard's job progress panel
use fwa_review_console_lib::application::JobParameters;
use fwa_review_console_lib::commands::{JobProgressView, PhaseView, RunStartedResponse};
use fwa_review_console_lib::domain::progress_engine::{FailureKind, RunState};
use fwa_review_console_lib::domain::{JobSummary, PhaseKey, PhaseStatus};

fn main() {
    use ts_rs::TS;

    println!("JobProgressView TS: {}", JobProgressView::name());
    println!("JobParameters TS: {}", JobParameters::name());

    let exports: [(&str, fn() -> Result<(), ts_rs::ExportError>); 9] = [
        ("JobProgressView", JobProgressView::export_all),
        ("PhaseView", PhaseView::export_all),
        ("RunStartedResponse", RunStartedResponse::export_all),
        ("JobParameters", JobParameters::export_all),
        ("JobSummary", JobSummary::export_all),
        ("PhaseKey", PhaseKey::export_all),
        ("PhaseStatus", PhaseStatus::export_all),
        ("RunState", RunState::export_all),
        ("FailureKind", FailureKind::export_all),
    ];

    let mut failed = false;
    for (name, export) in exports {
        if let Err(e) = export() {
            eprintln!("{name} export error: {e}");
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }
    println!("TypeScript bindings generated");
}
