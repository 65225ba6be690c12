// ABOUTME: Renders the PowerShell script a scheduled backup task runs unattended
// ABOUTME: Phases run in order: copy, rotate, prune, notify

pub mod powershell;
pub mod retention;

use crate::job::BackupJobSpec;
use powershell::{bool_literal, encode_command, quote};
use retention::{ROTATION_FORMAT_DOTNET, ROTATION_PATTERN};

/// Fully rendered script text. Regenerated for every registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript(String);

impl GeneratedScript {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Arguments for `powershell.exe` that run this script without a
    /// visible window and without any command-line quoting concerns.
    pub fn launch_arguments(&self) -> String {
        format!(
            "-NoProfile -NonInteractive -WindowStyle Hidden -ExecutionPolicy Bypass -EncodedCommand {}",
            encode_command(&self.0)
        )
    }
}

const COPY_PHASE: &str = r#"
function Copy-Folder($source, $target) {
    xcopy $source $target /e /y /i /h /o /k /x | Out-Null
    return $LASTEXITCODE
}
"#;

const NOTIFY_PHASE: &str = r#"
function Show-Toast($copyExitCode, $renameOk, $pruneOk, $deleted, $intended) {
    $stamp = [DateTime]::Now.ToShortTimeString() + ': '
    $titleFailure = $stamp + 'Your scheduled backup has failed'
    $contentSuccess = 'Your folder ' + $src + ' has been backed up to ' + $dest + '. '
    $contentFailure = 'Your folder ' + $src + ' has not been backed up to ' + $dest + '. '
    switch ($copyExitCode) {
        0 {
            $title = $stamp + 'Your scheduled backup was successful'
            $problems = @()
            if (-not $renameOk) { $problems += 'the backup folder could not be renamed.' }
            if (-not $pruneOk) { $problems += '' + $deleted + ' out of ' + $intended + ' old backups have been removed.' }
            if ($problems.Count -gt 0) {
                $content = $contentSuccess + 'However, ' + ($problems -join ' ')
            } elseif ($intended -gt 0) {
                $content = $contentSuccess + $deleted + ' old backup(s) have been removed. There were no errors.'
            } else {
                $content = $contentSuccess + 'There were no errors.'
            }
        }
        1 { $title = $titleFailure; $content = $contentFailure + 'No files were found to copy.' }
        4 { $title = $titleFailure; $content = $contentFailure + 'There was not enough memory or disk space (or the folder does not exist anymore).' }
        5 { $title = $titleFailure; $content = $contentFailure + 'A disk write error occurred.' }
        default { $title = $titleFailure; $content = $contentFailure + 'xcopy exited with code ' + $copyExitCode + '.' }
    }

    [Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] > $null
    [Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom.XmlDocument, ContentType = WindowsRuntime] > $null
    $template = [Windows.UI.Notifications.ToastNotificationManager]::GetTemplateContent([Windows.UI.Notifications.ToastTemplateType]::ToastText02)
    $toastXml = [xml] $template.GetXml()
    $texts = $toastXml.GetElementsByTagName('text')
    $texts[0].AppendChild($toastXml.CreateTextNode($title)) > $null
    $texts[1].AppendChild($toastXml.CreateTextNode($content)) > $null
    $actions = $toastXml.CreateElement('actions')
    $action = $toastXml.CreateElement('action')
    $action.SetAttribute('content', 'Dismiss')
    $action.SetAttribute('arguments', 'dismiss')
    $action.SetAttribute('activationType', 'system')
    $actions.AppendChild($action) > $null
    $toastXml.DocumentElement.AppendChild($actions) > $null
    $xml = New-Object Windows.Data.Xml.Dom.XmlDocument
    $xml.LoadXml($toastXml.OuterXml)
    $toast = [Windows.UI.Notifications.ToastNotification]::new($xml)
    $toast.Tag = $appTitle
    $toast.Group = $appTitle
    $toast.ExpirationTime = [DateTimeOffset]::Now.AddMinutes($toastExpirationInMinutes)
    [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier($appTitle).Show($toast)
}
"#;

/// Renders the backup script for `spec`.
///
/// The rotate phase is omitted entirely when `spec.overwrite` is set, and
/// the prune phase whenever the effective retention limit is 0. Every
/// user-supplied string is embedded as a single-quoted literal.
pub fn render_script(
    spec: &BackupJobSpec,
    app_title: &str,
    toast_expiration_minutes: u32,
) -> GeneratedScript {
    let rotate = !spec.overwrite;
    let limit = spec.effective_retention();
    let prune = rotate && limit > 0;

    let mut script = String::with_capacity(4096);
    script.push_str("$ErrorActionPreference = 'Stop'\n");
    script.push_str(&format!("$src = {}\n", quote(&spec.source_str())));
    script.push_str(&format!("$dest = {}\n", quote(&spec.destination_str())));
    script.push_str(&format!("$folderName = {}\n", quote(&spec.folder_name())));
    script.push_str("$destPath = $dest.TrimEnd('\\') + '\\' + $folderName\n");
    script.push_str(&format!("$overwrite = {}\n", bool_literal(spec.overwrite)));
    if prune {
        script.push_str(&format!("$backupLimit = {limit}\n"));
    }
    script.push_str(&format!("$appTitle = {}\n", quote(app_title)));
    script.push_str(&format!(
        "$toastExpirationInMinutes = {toast_expiration_minutes}\n"
    ));

    script.push_str(COPY_PHASE);
    if rotate {
        script.push_str(&rotate_phase());
    }
    if prune {
        script.push_str(&prune_phase());
    }
    script.push_str(NOTIFY_PHASE);

    script.push_str("\n$copyExitCode = Copy-Folder $src $destPath\n");
    if rotate {
        script.push_str("$renameOk = $true\n");
        script.push_str("$prune = @{ Ok = $true; Deleted = 0; Intended = 0 }\n");
        script.push_str("if ($copyExitCode -eq 0) {\n");
        script.push_str("    $renameOk = Rename-Backup $destPath $folderName\n");
        if prune {
            script.push_str("    $prune = Remove-Backup $backupLimit $dest $folderName\n");
        }
        script.push_str("}\n");
        script.push_str(
            "Show-Toast $copyExitCode $renameOk $prune.Ok $prune.Deleted $prune.Intended\n",
        );
    } else {
        script.push_str("Show-Toast $copyExitCode $true $true 0 0\n");
    }

    GeneratedScript(script)
}

fn rotate_phase() -> String {
    format!(
        r#"
function Rename-Backup($target, $folder) {{
    try {{
        $newName = $folder + '-' + (Get-Date -Format '{ROTATION_FORMAT_DOTNET}')
        Rename-Item -LiteralPath $target -NewName $newName
        return $true
    }} catch {{
        return $false
    }}
}}
"#
    )
}

fn prune_phase() -> String {
    format!(
        r#"
function Remove-Backup($limit, $parent, $folder) {{
    $result = @{{ Ok = $true; Deleted = 0; Intended = 0 }}
    $pattern = '^' + [regex]::Escape($folder) + '-{ROTATION_PATTERN}$'
    try {{
        $backups = @(Get-ChildItem -LiteralPath $parent -Directory |
            Where-Object {{ $_.Name -match $pattern }} |
            Sort-Object CreationTime)
        $result.Intended = [Math]::Max(0, $backups.Count - $limit)
        for ($i = 0; $i -lt $result.Intended; $i++) {{
            try {{
                Remove-Item -LiteralPath $backups[$i].FullName -Recurse -Force -Confirm:$false
                $result.Deleted += 1
            }} catch {{
                $result.Ok = $false
            }}
        }}
    }} catch {{
        $result.Ok = $false
    }}
    return $result
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BackupJobSpec {
        BackupJobSpec::weekly(r"C:\Users\me\Documents", r"E:\Backups", 2, 18)
    }

    #[test]
    fn test_paths_appear_once_as_literals() {
        let script = render_script(&spec().with_retention_limit(3), "GoBackup", 5);
        let text = script.as_str();
        assert_eq!(text.matches(r"'C:\Users\me\Documents'").count(), 1);
        assert_eq!(text.matches(r"'E:\Backups'").count(), 1);
        assert!(text.contains("$folderName = 'Documents'"));
        assert!(text.contains("$appTitle = 'GoBackup'"));
        assert!(text.contains("$toastExpirationInMinutes = 5"));
    }

    #[test]
    fn test_phase_order() {
        let script = render_script(&spec().with_retention_limit(3), "GoBackup", 5);
        let text = script.as_str();
        let copy = text.find("function Copy-Folder").unwrap();
        let rotate = text.find("function Rename-Backup").unwrap();
        let prune = text.find("function Remove-Backup").unwrap();
        let notify = text.find("function Show-Toast").unwrap();
        assert!(copy < rotate && rotate < prune && prune < notify);
        assert!(text.contains("$backupLimit = 3"));
        assert!(text.contains("$prune = Remove-Backup $backupLimit $dest $folderName"));
        assert!(text.contains(r"-20\d{6}_\d{6}$'"));
    }

    #[test]
    fn test_overwrite_has_no_rotate_text() {
        let script = render_script(&spec().with_retention_limit(3).with_overwrite(true), "GoBackup", 5);
        let text = script.as_str();
        assert!(!text.contains("Rename-Backup"));
        assert!(!text.contains("Rename-Item"));
        assert!(!text.contains(ROTATION_FORMAT_DOTNET));
        assert!(!text.contains("Remove-Backup"));
        assert!(!text.contains("$backupLimit"));
        assert!(text.contains("$overwrite = $true"));
        assert!(text.contains("Show-Toast $copyExitCode $true $true 0 0"));
    }

    #[test]
    fn test_unlimited_retention_skips_prune() {
        let script = render_script(&spec(), "GoBackup", 5);
        let text = script.as_str();
        assert!(text.contains("function Rename-Backup"));
        assert!(!text.contains("Remove-Backup"));
        assert!(!text.contains("$backupLimit"));
        assert!(text.contains("$overwrite = $false"));
    }

    #[test]
    fn test_quotes_in_paths_are_escaped() {
        let spec = BackupJobSpec::daily(r"C:\Bob's Files", r"D:\Back’up", 1);
        let script = render_script(&spec, "Team's Backup", 5);
        let text = script.as_str();
        assert!(text.contains(r"$src = 'C:\Bob''s Files'"));
        assert!(text.contains("$dest = 'D:\\Back’’up'"));
        assert!(text.contains("$folderName = 'Bob''s Files'"));
        assert!(text.contains("$appTitle = 'Team''s Backup'"));
    }

    #[test]
    fn test_prune_matches_folder_case_insensitively() {
        let script = render_script(&spec().with_retention_limit(3), "GoBackup", 5);
        let text = script.as_str();
        assert!(text.contains("$_.Name -match $pattern"));
        assert!(!text.contains("-cmatch"));
        assert!(retention::is_rotated_name(
            "documents",
            "Documents-20260101_120000"
        ));
    }

    #[test]
    fn test_notification_covers_exit_codes() {
        let text = render_script(&spec(), "GoBackup", 5).into_string();
        assert!(text.contains("No files were found to copy."));
        assert!(text.contains("not enough memory or disk space"));
        assert!(text.contains("A disk write error occurred."));
        assert!(text.contains("old backup(s) have been removed"));
    }

    #[test]
    fn test_launch_arguments_are_encoded() {
        let script = render_script(&spec(), "GoBackup", 5);
        let args = script.launch_arguments();
        assert!(args.starts_with("-NoProfile -NonInteractive -WindowStyle Hidden"));
        let encoded = args.rsplit(' ').next().unwrap();
        assert_eq!(encoded, encode_command(script.as_str()));
        assert!(!args.contains("Copy-Folder"));
    }
}
