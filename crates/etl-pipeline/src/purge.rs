use etl_types::{EtlError, PurgeStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    Deleted(u64),
    NoOp,
}

/// Purge strategy application (§4.3), run before insert and scoped to
/// `[fromEpoch, toEpoch]` for `loaderCode`. Runs against the caller's
/// transaction so a `PURGE_AND_RELOAD` delete and the window's subsequent
/// insert commit as one atomic unit (§9) — a crash between the two would
/// otherwise leave the window purged with nothing reloaded.
pub async fn apply_purge_strategy(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    loader_code: &str,
    purge_strategy: PurgeStrategy,
    from_epoch: i64,
    to_epoch: i64,
) -> Result<PurgeOutcome, EtlError> {
    match purge_strategy {
        PurgeStrategy::PurgeAndReload => {
            let deleted = etl_db::delete_signal_range(&mut **tx, loader_code, from_epoch, to_epoch).await?;
            Ok(PurgeOutcome::Deleted(deleted))
        }
        PurgeStrategy::FailOnDuplicate => {
            let existing = etl_db::count_signals_in_range(&mut **tx, loader_code, from_epoch, to_epoch).await?;
            if existing > 0 {
                return Err(EtlError::DuplicateData(format!(
                    "{existing} signal row(s) already exist for {loader_code} in [{from_epoch}, {to_epoch})"
                )));
            }
            Ok(PurgeOutcome::NoOp)
        }
        PurgeStrategy::SkipDuplicates => Ok(PurgeOutcome::NoOp),
    }
}
