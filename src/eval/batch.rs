use tracing::debug;

use crate::error::EvalError;

pub fn batch<T>(items: &[T], batch_size: usize) -> Result<Vec<&[T]>, EvalError> {
    if batch_size == 0 {
        return Err(EvalError::invalid("batch size must be a positive integer"));
    }

    debug!(total_entries = items.len(), batch_size, "splitting into batches");
    Ok(items.chunks(batch_size).collect())
}
