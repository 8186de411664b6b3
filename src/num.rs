/// Format a number with `_` between every 3 digits, padded to at least 9
/// digits: `000_120_000`.
pub(crate) fn format_pad9_u64(n: u64) -> String {
    let x = format!("{:09}", n);
    let len = x.len();
    x.chars().enumerate().fold(String::new(), |mut acc, (i, c)| {
        if i > 0 && (len - i) % 3 == 0 {
            acc.push('_');
        }
        acc.push(c);
        acc
    })
}

/// Render one LSN component of a run file name: `<partition:010>_<offset:010>`.
pub(crate) fn format_lsn_for_file_name(partition: u32, offset: u32) -> String {
    format!("{:010}_{:010}", partition, offset)
}

/// Parse the output of [`format_lsn_for_file_name`].
pub(crate) fn parse_lsn_from_file_name(s: &str) -> Result<(u32, u32), String> {
    let (p, o) = s
        .split_once('_')
        .ok_or_else(|| format!("'{}' has no '_' separator", s))?;

    if p.len() != 10 || o.len() != 10 {
        return Err(format!("'{}' is not two 10 digit numbers", s));
    }

    let partition = p
        .parse::<u32>()
        .map_err(|e| format!("cannot parse partition '{}': {}", p, e))?;
    let offset = o
        .parse::<u32>()
        .map_err(|e| format!("cannot parse offset '{}': {}", o, e))?;

    Ok((partition, offset))
}

#[cfg(test)]
mod tests {
    use super::format_lsn_for_file_name;
    use super::format_pad9_u64;
    use super::parse_lsn_from_file_name;

    #[test]
    fn test_format_pad9_u64() {
        assert_eq!(format_pad9_u64(u64::MAX), "18_446_744_073_709_551_615");
        assert_eq!(format_pad9_u64(1_200_000), "001_200_000");
        assert_eq!(format_pad9_u64(120_000), "000_120_000");
        assert_eq!(format_pad9_u64(0), "000_000_000");
    }

    #[test]
    fn test_lsn_file_name_component() {
        assert_eq!(format_lsn_for_file_name(1, 4096), "0000000001_0000004096");
        assert_eq!(
            parse_lsn_from_file_name("0000000001_0000004096"),
            Ok((1, 4096))
        );
        assert_eq!(
            parse_lsn_from_file_name("4294967295_4294967295"),
            Ok((u32::MAX, u32::MAX))
        );

        assert!(parse_lsn_from_file_name("1_4096").is_err());
        assert!(parse_lsn_from_file_name("0000000001-0000004096").is_err());
        assert!(parse_lsn_from_file_name("000000000x_0000004096").is_err());
        assert!(parse_lsn_from_file_name("9999999999_0000004096").is_err());
    }
}
