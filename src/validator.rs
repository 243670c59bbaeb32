use tracing::warn;

use crate::cache::ReferenceCache;
use crate::fmt::money;
use crate::models::{DimensionDefinition, EntryGroup, ErrorType, ValidationError};
use crate::reference::{find_dimension, ResolveError};

/// Classify every defect of one group against the chart of accounts and dimension list.
///
/// Pure: nothing is created or changed. Returns `Err` only when the account source
/// is unavailable as a whole; single failed lookups become line errors. Errors are
/// sorted by original row.
pub fn validate_group(
    group: &EntryGroup,
    refs: &ReferenceCache,
    dimensions: &[DimensionDefinition],
) -> Result<Vec<ValidationError>, ResolveError> {
    let mut errors = Vec::new();

    for line in &group.lines {
        let row = line.original_row;

        for missing in &line.missing_fields {
            errors.push(
                ValidationError::new(
                    ErrorType::MissingField,
                    row,
                    format!("Row {row} has no usable {}", missing.field_name()),
                )
                .on_field(missing.field_name()),
            );
        }

        if let Some(code) = &line.account_code {
            let message = match refs.account(code) {
                Ok(Some(account)) if account.active => None,
                Ok(Some(_)) => Some(format!("Account {code} is inactive")),
                Ok(None) => Some(format!("Account {code} does not exist in the chart of accounts")),
                Err(ResolveError::Lookup(reason)) => {
                    warn!(row, account = %code, %reason, "account lookup failed");
                    Some(format!("Account {code} could not be resolved: {reason}"))
                }
                Err(e @ ResolveError::Unavailable(_)) => return Err(e),
            };
            if let Some(message) = message {
                errors.push(ValidationError::new(ErrorType::InvalidAccount, row, message).on_field("accountCode"));
            }
        }

        for name in line.dimensions.keys() {
            if find_dimension(dimensions, name).is_none() {
                errors.push(
                    ValidationError::new(
                        ErrorType::InvalidDimensionName,
                        row,
                        format!("'{name}' is not a known dimension"),
                    )
                    .on_field(name.clone()),
                );
            }
        }
    }

    if group.balance_cents != 0 {
        errors.push(
            ValidationError::new(
                ErrorType::UnbalancedGroup,
                group.last_row(),
                format!("Entry is out of balance by {}", money(group.balance_cents)),
            )
            .on_field("amount"),
        );
    }

    let has_debit = group.lines.iter().any(|l| l.amount_cents > 0);
    let has_credit = group.lines.iter().any(|l| l.amount_cents < 0);
    if group.lines.len() < 2 {
        errors.push(ValidationError::new(
            ErrorType::InvalidStructure,
            group.first_row(),
            "Entry needs at least two lines",
        ));
    } else if !has_debit || !has_credit {
        errors.push(ValidationError::new(
            ErrorType::InvalidStructure,
            group.first_row(),
            "Entry needs at least one debit and one credit line",
        ));
    }

    errors.sort_by_key(|e| e.original_row);
    Ok(errors)
}
